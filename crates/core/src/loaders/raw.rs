use crate::facts::FactStore;
use crate::model::Module;
use crate::row;

/// Candidate entries for containers without entry metadata: the start of
/// every executable section.
pub fn raw_entry_loader(module: &Module, facts: &mut FactStore) {
    facts.insert(
        "raw_entry",
        module.sections.iter().filter(|s| s.flags.executable).map(|s| row![s.address]),
    );
}
