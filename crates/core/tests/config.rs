use disasm_core::config::{
    build_pipeline, load_pipeline_config, pass_by_name, ConfigError, PipelineConfig, PASS_NAMES,
};

#[test]
fn default_config_builds_full_pipeline() {
    let config = PipelineConfig::default();
    assert_eq!(config.passes, PASS_NAMES);
    let pipeline = build_pipeline(&config).expect("valid");
    let names: Vec<&str> = pipeline.passes().map(|p| p.name()).collect();
    assert_eq!(names, vec!["disassembly", "no return analysis", "function inference"]);
    let rulesets: Vec<&str> = pipeline.passes().map(|p| p.source_ruleset()).collect();
    assert_eq!(rulesets, vec!["disasm", "no_return_analysis", "function_inference"]);
}

#[test]
fn every_builtin_pass_resolves() {
    for name in PASS_NAMES {
        let pass = pass_by_name(name).expect("builtin pass");
        assert_eq!(pass.name(), *name);
        assert!(pass.has_load() && pass.has_transform());
    }
    assert!(pass_by_name("nope").is_none());
}

#[test]
fn loads_json_and_yaml_configs() {
    let temp = tempfile::tempdir().unwrap();
    let json_path = temp.path().join("pipeline.json");
    std::fs::write(&json_path, r#"{"name":"quick","passes":["disassembly"]}"#).unwrap();
    let yaml_path = temp.path().join("pipeline.yaml");
    std::fs::write(&yaml_path, "name: full\npasses:\n  - disassembly\n  - no return analysis\n")
        .unwrap();

    let json = load_pipeline_config(&json_path).expect("json");
    assert_eq!(json.name, "quick");
    assert_eq!(json.passes, vec!["disassembly"]);

    let yaml = load_pipeline_config(&yaml_path).expect("yaml");
    assert_eq!(yaml.name, "full");
    assert_eq!(build_pipeline(&yaml).unwrap().len(), 2);
}

#[test]
fn config_errors_are_reported() {
    let temp = tempfile::tempdir().unwrap();

    let missing = load_pipeline_config(&temp.path().join("absent.json")).unwrap_err();
    assert!(missing.to_string().contains("Failed to read pipeline config"));

    let toml = temp.path().join("pipeline.toml");
    std::fs::write(&toml, "name = 'x'").unwrap();
    let err = load_pipeline_config(&toml).unwrap_err();
    assert!(matches!(err.downcast_ref::<ConfigError>(), Some(ConfigError::UnsupportedFormat(_))));

    let broken = temp.path().join("broken.json");
    std::fs::write(&broken, "{ not json").unwrap();
    assert!(load_pipeline_config(&broken).is_err());
}

#[test]
fn unknown_and_misordered_passes_are_rejected() {
    let unknown = PipelineConfig { name: "x".into(), passes: vec!["lifting".into()] };
    assert!(matches!(build_pipeline(&unknown), Err(ConfigError::UnknownPass(ref p)) if p == "lifting"));

    let misordered = PipelineConfig {
        name: "x".into(),
        passes: vec!["function inference".into(), "disassembly".into()],
    };
    assert!(matches!(build_pipeline(&misordered), Err(ConfigError::Pipeline(_))));
}
