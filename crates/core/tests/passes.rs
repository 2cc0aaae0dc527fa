use std::cell::RefCell;
use std::rc::Rc;

use disasm_core::engine::{EngineError, InMemoryEngine};
use disasm_core::facts::FactStore;
use disasm_core::model::{ByteOrder, Isa, Module};
use disasm_core::passes::{
    AnalysisContext, AnalysisPass, AnalysisPassResult, DisassemblyPass, FunctionInferencePass,
    NoReturnAnalysisPass, PassError, PassPipeline, PassState, PipelineError, Stage,
};
use disasm_core::row;
use disasm_core::targets::default_target_registry;

const BASE: u64 = 0x1000;

fn fixture_module() -> Module {
    // Three MIPS nops at 0x1000, 0x1004, 0x1008.
    Module::raw(vec![0; 12], Isa::Mips32, ByteOrder::Big, BASE).with_entry_point(BASE)
}

fn unsigned_column(facts: &FactStore, relation: &str, column: usize) -> Vec<u64> {
    facts.rows(relation).iter().filter_map(|r| r.get(column)?.as_unsigned()).collect()
}

/// Programs standing in for the compiled rule sets.
fn fixture_engine() -> InMemoryEngine {
    let mut engine = InMemoryEngine::new();
    engine.register("disasm_mips32", |facts: &mut FactStore| {
        if facts.len("instruction") != 3 {
            return Err(EngineError::Evaluation {
                program: "disasm_mips32".into(),
                message: "expected three instructions".into(),
            });
        }
        for address in [BASE, BASE + 4, BASE + 8] {
            facts.insert_row("block_information", row![address, 4u64]);
        }
        facts.insert("cfg_edge", vec![
            row![BASE, BASE + 8, "call"],
            row![BASE, BASE + 4, "fallthrough"],
            row![BASE + 4, BASE + 8, "fallthrough"],
        ]);
        facts.insert_row("inferred_symbol", row![BASE + 8, "exit"]);
        Ok(())
    });
    engine.register("no_return_analysis", |facts: &mut FactStore| {
        let exits = unsigned_column(facts, "symbol", 0);
        let calls: Vec<u64> = facts
            .rows("cfg_edge")
            .iter()
            .filter(|r| r[2].as_symbol() == Some("call"))
            .filter(|r| r[1].as_unsigned().is_some_and(|to| exits.contains(&to)))
            .filter_map(|r| r[0].as_unsigned())
            .collect();
        facts.insert("no_return_call", calls.into_iter().map(|b| row![b]));
        Ok(())
    });
    engine.register("function_inference", |facts: &mut FactStore| {
        let mut entries = unsigned_column(facts, "entry_point", 0);
        for r in facts.rows("cfg_edge") {
            if r[2].as_symbol() == Some("call") {
                entries.extend(r[1].as_unsigned());
            }
        }
        entries.sort_unstable();
        entries.dedup();
        let blocks = unsigned_column(facts, "block", 0);
        let owned: Vec<_> = blocks
            .iter()
            .filter_map(|b| entries.iter().rev().find(|e| *e <= b).map(|e| row![*b, *e]))
            .collect();
        facts.insert("function_entry", entries.iter().map(|e| row![*e]));
        facts.insert("in_function", owned);
        Ok(())
    });
    engine
}

fn full_pipeline() -> PassPipeline {
    let mut pipeline = PassPipeline::new("default");
    pipeline.add(DisassemblyPass).add(NoReturnAnalysisPass).add(FunctionInferencePass);
    pipeline
}

#[test]
fn full_pipeline_updates_module() {
    let engine = fixture_engine();
    let targets = default_target_registry();
    let ctx = AnalysisContext::new(&engine, &targets);
    let mut module = fixture_module();

    let mut pipeline = full_pipeline();
    let report = pipeline.run(&ctx, &mut module).expect("pipeline run");

    assert_eq!(module.code_blocks.len(), 3);
    assert!(!module.cfg_edges.iter().any(|e| e.from == BASE && e.kind == "fallthrough"));
    assert!(module.cfg_edges.iter().any(|e| e.from == BASE + 4 && e.kind == "fallthrough"));
    assert_eq!(module.cfg_edges.len(), 2);

    assert_eq!(module.functions.len(), 2);
    assert_eq!(module.functions[&BASE].blocks, vec![BASE, BASE + 4]);
    assert_eq!(module.functions[&(BASE + 8)].blocks, vec![BASE + 8]);
    assert_eq!(module.symbol_at(BASE).map(|s| s.name.as_str()), Some("FUN_1000"));
    assert_eq!(module.symbol_at(BASE + 8).map(|s| s.name.as_str()), Some("exit"));

    assert_eq!(report.passes.len(), 3);
    assert!(report.passes.iter().all(|p| p.state == PassState::Done));
    let no_return = report.result("no return analysis").expect("result");
    assert_eq!(no_return.rows("no_return_call"), &[row![BASE]]);
    let inference = report.result("function inference").expect("result");
    assert_eq!(inference.rows("no_return_call"), &[row![BASE]]);
    assert_eq!(
        pipeline.states(),
        vec![
            ("disassembly", PassState::Done),
            ("no return analysis", PassState::Done),
            ("function inference", PassState::Done),
        ]
    );
}

#[test]
fn missing_dependency_fails_before_any_pass_runs() {
    let engine = fixture_engine();
    let targets = default_target_registry();
    let ctx = AnalysisContext::new(&engine, &targets);
    let mut module = fixture_module();
    let before = module.clone();

    let mut pipeline = PassPipeline::new("broken");
    pipeline.add(DisassemblyPass).add(FunctionInferencePass);
    let err = pipeline.run(&ctx, &mut module).unwrap_err();

    match err {
        PipelineError::MissingDependency { pass, dependency } => {
            assert_eq!(pass, "function inference");
            assert_eq!(dependency, "no return analysis");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(module, before);
    assert!(pipeline.states().iter().all(|(_, s)| *s == PassState::Pending));
}

#[test]
fn dependency_must_run_earlier_not_later() {
    let mut pipeline = PassPipeline::new("reordered");
    pipeline.add(NoReturnAnalysisPass).add(DisassemblyPass);
    assert!(matches!(pipeline.validate(), Err(PipelineError::MissingDependency { .. })));
}

#[test]
fn stage_failure_aborts_remaining_passes() {
    // No program for the no-return pass.
    let mut partial = InMemoryEngine::new();
    partial.register_empty("disasm_mips32");
    let targets = default_target_registry();
    let ctx = AnalysisContext::new(&partial, &targets);
    let mut module = fixture_module();

    let mut pipeline = full_pipeline();
    let err = pipeline.run(&ctx, &mut module).unwrap_err();
    match err {
        PipelineError::StageFailed { pass, stage, source } => {
            assert_eq!(pass, "no return analysis");
            assert_eq!(stage, Stage::Load);
            assert!(matches!(source, PassError::EngineInstantiationFailed(ref p) if p == "no_return_analysis"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        pipeline.states(),
        vec![
            ("disassembly", PassState::Done),
            ("no return analysis", PassState::Pending),
            ("function inference", PassState::Pending),
        ]
    );
}

#[test]
fn malformed_derived_relation_fails_transform() {
    let mut engine = InMemoryEngine::new();
    engine.register("disasm_mips32", |facts: &mut FactStore| {
        facts.insert_row("block_information", row!["not-an-address", 4u64]);
        Ok(())
    });
    let targets = default_target_registry();
    let ctx = AnalysisContext::new(&engine, &targets);
    let mut module = fixture_module();

    let mut pipeline = PassPipeline::new("single");
    pipeline.add(DisassemblyPass);
    let err = pipeline.run(&ctx, &mut module).unwrap_err();
    match err {
        PipelineError::StageFailed { stage, source, .. } => {
            assert_eq!(stage, Stage::Transform);
            assert!(matches!(source, PassError::MalformedRelation { ref relation, .. } if relation == "block_information"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(pipeline.states(), vec![("disassembly", PassState::Loaded)]);
}

#[test]
fn malformed_row_leaves_module_untouched() {
    let mut engine = InMemoryEngine::new();
    engine.register("disasm_mips32", |facts: &mut FactStore| {
        facts.insert_row("block_information", row![BASE, 4u64]);
        facts.insert_row("inferred_symbol", row![BASE, "start"]);
        facts.insert_row("cfg_edge", row![BASE, BASE + 4]);
        Ok(())
    });
    let targets = default_target_registry();
    let ctx = AnalysisContext::new(&engine, &targets);
    let mut module = fixture_module();
    let symbols_before = module.symbols.len();

    let mut pipeline = PassPipeline::new("single");
    pipeline.add(DisassemblyPass);
    let err = pipeline.run(&ctx, &mut module).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::StageFailed { source: PassError::MalformedRelation { ref relation, .. }, .. }
            if relation == "cfg_edge"
    ));
    assert!(module.code_blocks.is_empty());
    assert!(module.cfg_edges.is_empty());
    assert_eq!(module.symbols.len(), symbols_before);
}

#[test]
fn engine_errors_surface_as_load_failures() {
    let engine = fixture_engine();
    let targets = default_target_registry();
    let ctx = AnalysisContext::new(&engine, &targets);
    // Only two instructions, which the fixture program rejects.
    let mut module = Module::raw(vec![0; 8], Isa::Mips32, ByteOrder::Big, BASE);

    let mut pipeline = full_pipeline();
    let err = pipeline.run(&ctx, &mut module).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::StageFailed { stage: Stage::Load, source: PassError::Engine(_), .. }
    ));
    assert!(module.code_blocks.is_empty());
}

#[test]
fn unsupported_target_fails_disassembly_load() {
    let engine = fixture_engine();
    let targets = default_target_registry();
    let ctx = AnalysisContext::new(&engine, &targets);
    let mut module = Module::raw(vec![0; 8], Isa::Arm64, ByteOrder::Little, BASE);

    let mut pipeline = PassPipeline::new("single");
    pipeline.add(DisassemblyPass);
    let err = pipeline.run(&ctx, &mut module).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::StageFailed { stage: Stage::Load, source: PassError::Target(_), .. }
    ));
}

/// Records the order of its stages and what transform could see.
struct TracingPass {
    trace: Rc<RefCell<Vec<String>>>,
    load: bool,
    transform: bool,
}

impl AnalysisPass for TracingPass {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn source_ruleset(&self) -> &'static str {
        "tracing"
    }

    fn has_load(&self) -> bool {
        self.load
    }

    fn has_transform(&self) -> bool {
        self.transform
    }

    fn load(
        &self,
        result: &mut AnalysisPassResult,
        _ctx: &AnalysisContext<'_>,
        _module: &Module,
        previous: Option<&AnalysisPassResult>,
    ) -> Result<(), PassError> {
        let mut facts = FactStore::new("tracing");
        facts.insert_row("marker", row!["loaded"]);
        result.facts = Some(facts);
        self.trace.borrow_mut().push(format!("load previous={}", previous.is_some()));
        Ok(())
    }

    fn transform(
        &self,
        result: &mut AnalysisPassResult,
        _ctx: &AnalysisContext<'_>,
        module: &mut Module,
    ) -> Result<(), PassError> {
        let seen = result.rows("marker").len();
        self.trace.borrow_mut().push(format!("transform saw {seen}"));
        module.add_code_block(0x42, 1);
        Ok(())
    }
}

#[test]
fn load_completes_before_transform_begins() {
    let engine = InMemoryEngine::new();
    let targets = default_target_registry();
    let ctx = AnalysisContext::new(&engine, &targets);
    let trace = Rc::new(RefCell::new(Vec::new()));
    let mut module = fixture_module();

    let mut pipeline = PassPipeline::new("trace");
    pipeline.add(TracingPass { trace: Rc::clone(&trace), load: true, transform: true });
    pipeline.run(&ctx, &mut module).expect("run");

    assert_eq!(*trace.borrow(), vec!["load previous=false", "transform saw 1"]);
    assert!(module.code_blocks.contains_key(&0x42));
}

#[test]
fn disabled_stages_are_skipped() {
    let engine = InMemoryEngine::new();
    let targets = default_target_registry();
    let ctx = AnalysisContext::new(&engine, &targets);
    let trace = Rc::new(RefCell::new(Vec::new()));
    let mut module = fixture_module();
    let before = module.clone();

    let mut pipeline = PassPipeline::new("trace");
    pipeline.add(TracingPass { trace: Rc::clone(&trace), load: true, transform: false });
    let report = pipeline.run(&ctx, &mut module).expect("run");

    assert_eq!(*trace.borrow(), vec!["load previous=false"]);
    assert_eq!(module, before);
    assert_eq!(report.passes[0].state, PassState::Done);
    assert!(report.result("tracing").and_then(|r| r.facts.as_ref()).is_some());
}
