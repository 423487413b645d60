//! Status command.

use crate::config::Settings;
use crate::index::fields;

use super::sync::open_engine;

pub fn run_status(settings: &Settings) -> anyhow::Result<()> {
    let engine = open_engine(settings)?;
    let gateway = engine.gateway();

    println!("Index:        {}", settings.index_path.display());
    println!("Records:      {}", gateway.document_count());
    println!(
        "Error docs:   {}",
        gateway
            .find_by_field(fields::DOC_TYPE, crate::index::record::ERROR_DOC_TYPE)?
            .len()
    );
    println!("Directories:  {}", engine.registry().len());
    for dir in engine.registry().all_bindings() {
        println!("  [{}] {}", dir.priority, dir.path.display());
    }

    let messages = engine.status_messages();
    if messages.is_empty() {
        println!("No passes recorded yet.");
    } else {
        println!("Recent activity:");
        for message in messages.iter().rev() {
            println!("  {message}");
        }
    }
    Ok(())
}
