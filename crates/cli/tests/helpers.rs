use std::path::Path;

use disasm_facts::commands::{facts_command, load_module, plan_command, targets_command, FactsArgs};
use disasm_facts::{parse_address, resolve_path};
use disasm_core::model::{ByteOrder, FileFormat, Isa};
use tempfile::tempdir;

fn raw_args(binary: String, isa: &str, endian: &str) -> FactsArgs {
    FactsArgs {
        binary,
        raw: true,
        isa: Some(isa.into()),
        endian: endian.into(),
        base: "0x1000".into(),
        json: false,
    }
}

#[test]
fn parse_address_accepts_decimal_and_hex() {
    assert_eq!(parse_address("4096").unwrap(), 4096);
    assert_eq!(parse_address("0x1000").unwrap(), 0x1000);
    assert_eq!(parse_address(" 0XfF ").unwrap(), 0xff);
    assert!(parse_address("0xzz").is_err());
    assert!(parse_address("").is_err());
}

#[test]
fn resolve_path_keeps_absolute_paths() {
    let tmp = tempdir().expect("tempdir");
    let abs = tmp.path().join("file.bin");
    assert_eq!(resolve_path(abs.to_str().unwrap()).unwrap(), abs);
    let rel = resolve_path("relative.bin").unwrap();
    assert!(rel.is_absolute());
    assert!(rel.ends_with(Path::new("relative.bin")));
}

#[test]
fn load_module_builds_raw_modules() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("code.bin");
    std::fs::write(&path, [0x01, 0x00, 0xA0, 0xE1]).unwrap();

    let module = load_module(&raw_args(path.to_string_lossy().to_string(), "arm", "le")).unwrap();
    assert_eq!(module.name, "code.bin");
    assert_eq!(module.file_format, FileFormat::Raw);
    assert_eq!(module.isa, Isa::Arm);
    assert_eq!(module.byte_order, ByteOrder::Little);
    assert_eq!(module.preferred_address, 0x1000);
}

#[test]
fn load_module_rejects_bad_raw_options() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("code.bin");
    std::fs::write(&path, [0u8; 4]).unwrap();
    let binary = path.to_string_lossy().to_string();

    let err = load_module(&raw_args(binary.clone(), "sparc", "le")).unwrap_err();
    assert!(err.to_string().contains("Unknown ISA"));
    let err = load_module(&raw_args(binary.clone(), "mips32", "middle")).unwrap_err();
    assert!(err.to_string().contains("Invalid byte order"));

    let mut no_isa = raw_args(binary, "mips32", "be");
    no_isa.isa = None;
    assert!(load_module(&no_isa).unwrap_err().to_string().contains("--raw requires --isa"));
}

#[test]
fn commands_run_in_process() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("code.bin");
    std::fs::write(&path, [0x00, 0x85, 0x10, 0x21]).unwrap();

    targets_command(false).unwrap();
    targets_command(true).unwrap();
    facts_command(&raw_args(path.to_string_lossy().to_string(), "mips32", "be")).unwrap();

    let config = tmp.path().join("pipeline.yml");
    std::fs::write(&config, "name: quick\npasses: [disassembly]\n").unwrap();
    plan_command(config.to_str().unwrap(), false).unwrap();
    plan_command(config.to_str().unwrap(), true).unwrap();
}
