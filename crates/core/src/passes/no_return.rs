use super::{
    expect_arity, instantiate, submit_module_graph, unsigned_at, AnalysisContext, AnalysisPass,
    AnalysisPassResult, PassError,
};
use crate::model::Module;

/// Finds calls that never return and cuts the fall-through edge after them.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReturnAnalysisPass;

impl AnalysisPass for NoReturnAnalysisPass {
    fn name(&self) -> &'static str {
        "no return analysis"
    }

    fn source_ruleset(&self) -> &'static str {
        "no_return_analysis"
    }

    fn dependency(&self) -> Option<&'static str> {
        Some("disassembly")
    }

    fn load(
        &self,
        result: &mut AnalysisPassResult,
        ctx: &AnalysisContext<'_>,
        module: &Module,
        _previous: Option<&AnalysisPassResult>,
    ) -> Result<(), PassError> {
        let mut facts = instantiate(ctx, self.source_ruleset())?;
        submit_module_graph(module, &mut facts);
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
        let mut removed = 0;
        for row in result.rows("no_return_call") {
            expect_arity("no_return_call", row, 1)?;
            let block = unsigned_at("no_return_call", row, 0)?;
            removed += module.remove_fallthrough_edges(block);
        }
        log::debug!("{}: removed {removed} fall-through edges", module.name);
        Ok(())
    }
}
