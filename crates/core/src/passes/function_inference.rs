use super::{
    expect_arity, instantiate, submit_module_graph, unsigned_at, AnalysisContext, AnalysisPass,
    AnalysisPassResult, PassError,
};
use crate::model::{Module, Symbol};
use crate::row;

/// Groups blocks into functions using the no-return results.
#[derive(Debug, Default, Clone, Copy)]
pub struct FunctionInferencePass;

impl AnalysisPass for FunctionInferencePass {
    fn name(&self) -> &'static str {
        "function inference"
    }

    fn source_ruleset(&self) -> &'static str {
        "function_inference"
    }

    fn dependency(&self) -> Option<&'static str> {
        Some("no return analysis")
    }

    fn load(
        &self,
        result: &mut AnalysisPassResult,
        ctx: &AnalysisContext<'_>,
        module: &Module,
        previous: Option<&AnalysisPassResult>,
    ) -> Result<(), PassError> {
        let previous = previous.ok_or_else(|| {
            PassError::MissingPrevious(self.dependency().unwrap_or_default().to_string())
        })?;

        let mut facts = instantiate(ctx, self.source_ruleset())?;
        submit_module_graph(module, &mut facts);
        if let Some(entry) = module.entry_point {
            facts.insert_row("entry_point", row![entry]);
        }
        facts.insert("no_return_call", previous.rows("no_return_call").iter().cloned());
        ctx.engine.run(&mut facts)?;
        result.facts = Some(facts);
        Ok(())
    }

    fn transform(
        &self,
        result: &mut AnalysisPassResult,
        _ctx: &AnalysisContext<'_>,
        module: &mut Module,
    ) -> Result<(), PassError> {
        let entries = result
            .rows("function_entry")
            .iter()
            .map(|row| {
                expect_arity("function_entry", row, 1)?;
                unsigned_at("function_entry", row, 0)
            })
            .collect::<Result<Vec<_>, PassError>>()?;
        let members = result
            .rows("in_function")
            .iter()
            .map(|row| {
                expect_arity("in_function", row, 2)?;
                Ok((unsigned_at("in_function", row, 0)?, unsigned_at("in_function", row, 1)?))
            })
            .collect::<Result<Vec<_>, PassError>>()?;

        for entry in entries {
            module.add_function(entry);
            if module.symbol_at(entry).is_none() {
                module.add_symbol(Symbol::function(format!("FUN_{entry:x}"), entry));
            }
        }
        for (block, entry) in members {
            let function = module.add_function(entry);
            if !function.blocks.contains(&block) {
                function.blocks.push(block);
            }
        }
        log::debug!("{}: {} functions", module.name, module.functions.len());
        Ok(())
    }
}
