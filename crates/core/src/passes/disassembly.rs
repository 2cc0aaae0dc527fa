use super::{
    expect_arity, symbol_at, unsigned_at, AnalysisContext, AnalysisPass, AnalysisPassResult,
    PassError,
};
use crate::model::{Module, Symbol};

/// Extracts the module's facts through its target pipeline, runs the
/// disassembly program and records the blocks, edges and symbols it derives.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisassemblyPass;

impl AnalysisPass for DisassemblyPass {
    fn name(&self) -> &'static str {
        "disassembly"
    }

    fn source_ruleset(&self) -> &'static str {
        "disasm"
    }

    fn load(
        &self,
        result: &mut AnalysisPassResult,
        ctx: &AnalysisContext<'_>,
        module: &Module,
        _previous: Option<&AnalysisPassResult>,
    ) -> Result<(), PassError> {
        let descriptor = module.target_descriptor();
        let pipeline = ctx.targets.pipeline(&descriptor)?;
        let mut facts = pipeline
            .load(module, ctx.engine)
            .ok_or_else(|| PassError::EngineInstantiationFailed(pipeline.name().to_string()))?;
        if facts.len("instruction") == 0 {
            result.warn(format!("no instructions decoded for {}", module.name));
        }
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
        // Every row is checked before the module is touched.
        let blocks = result
            .rows("block_information")
            .iter()
            .map(|row| {
                expect_arity("block_information", row, 2)?;
                Ok((
                    unsigned_at("block_information", row, 0)?,
                    unsigned_at("block_information", row, 1)?,
                ))
            })
            .collect::<Result<Vec<_>, PassError>>()?;
        let edges = result
            .rows("cfg_edge")
            .iter()
            .map(|row| {
                expect_arity("cfg_edge", row, 3)?;
                Ok((
                    unsigned_at("cfg_edge", row, 0)?,
                    unsigned_at("cfg_edge", row, 1)?,
                    symbol_at("cfg_edge", row, 2)?,
                ))
            })
            .collect::<Result<Vec<_>, PassError>>()?;
        let symbols = result
            .rows("inferred_symbol")
            .iter()
            .map(|row| {
                expect_arity("inferred_symbol", row, 2)?;
                Ok((unsigned_at("inferred_symbol", row, 0)?, symbol_at("inferred_symbol", row, 1)?))
            })
            .collect::<Result<Vec<_>, PassError>>()?;

        for (address, size) in blocks {
            module.add_code_block(address, size);
        }
        for (from, to, kind) in edges {
            module.add_cfg_edge(from, to, kind);
        }
        for (address, name) in symbols {
            module.add_symbol(Symbol::function(name, address));
        }
        log::debug!(
            "{}: {} blocks, {} edges after disassembly",
            module.name,
            module.code_blocks.len(),
            module.cfg_edges.len()
        );
        Ok(())
    }
}
