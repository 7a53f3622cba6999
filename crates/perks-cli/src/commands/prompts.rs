//! Extraction prompt and bank layout commands

use std::collections::BTreeMap;

use anyhow::Result;
use perks_core::prompts::{default_prompts_dir, PromptId, PromptLibrary};
use perks_core::rewards::rewrite::rules;
use perks_core::tables::default_tables_path;
use perks_core::StatementTables;

/// Variables of the `{{#if var}}` blocks a template renders conditionally
pub fn conditional_blocks(content: &str) -> Vec<String> {
    let mut blocks: Vec<String> = Vec::new();
    for (start, _) in content.match_indices("{{#if ") {
        let rest = &content[start + "{{#if ".len()..];
        if let Some(end) = rest.find("}}") {
            let var = rest[..end].trim().to_string();
            if !var.is_empty() && !blocks.contains(&var) {
                blocks.push(var);
            }
        }
    }
    blocks
}

/// List prompts with their version, override state and optional blocks
pub fn cmd_prompts_list() -> Result<()> {
    let mut library = PromptLibrary::new();

    println!(
        "{:<20} {:>7}  {:<8}  {}",
        "ID", "VERSION", "SOURCE", "OPTIONAL BLOCKS"
    );
    println!("{}", "-".repeat(72));

    for id in PromptId::all() {
        let prompt = library.get(*id)?;
        let source = if prompt.is_override { "custom" } else { "default" };
        let blocks = conditional_blocks(&prompt.content);
        println!(
            "{:<20} {:>7}  {:<8}  {}",
            prompt.metadata.id,
            prompt.metadata.version,
            source,
            if blocks.is_empty() {
                "-".to_string()
            } else {
                blocks.join(", ")
            }
        );
    }

    println!();
    println!("Bank mappings are filled in per statement; see `perks prompts banks`.");
    Ok(())
}

/// Show a prompt, followed by the bank mappings it can receive
pub fn cmd_prompts_show(prompt_id: &str) -> Result<()> {
    let mut library = PromptLibrary::new();

    let id: PromptId = match prompt_id.parse() {
        Ok(id) => id,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("Known prompts:");
            for id in PromptId::all() {
                eprintln!("  - {}", id.as_str());
            }
            return Ok(());
        }
    };

    let prompt = library.get(id)?;

    println!("Prompt:  {} (v{})", prompt.metadata.id, prompt.metadata.version);
    match prompt.override_path {
        Some(ref path) if prompt.is_override => println!("Source:  {}", path.display()),
        _ => println!("Source:  built in"),
    }

    println!();
    println!("{}", prompt.content);

    if id == PromptId::ExtractRewards {
        println!();
        println!("--- Mapping when a bank layout is rewritten (bank_instructions) ---");
        for rule in rules() {
            println!();
            println!("{}", rule.instructions());
        }
        println!();
        println!("--- Fallback when no layout is recognized (bank_layouts) ---");
        println!("{}", perks_core::rewards::known_layouts());
    }

    Ok(())
}

/// Banks with a known reward summary layout and the sender domains that
/// identify their statement mail
pub fn cmd_prompts_banks() -> Result<()> {
    let tables = StatementTables::global();

    let mut domains: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (domain, bank) in &tables.bank_domains {
        domains.entry(bank.as_str()).or_default().push(domain.as_str());
    }

    for rule in rules() {
        println!("{}", rule.bank);
        println!("  layout:  {}", rule.layout);
        match domains.remove(rule.bank) {
            Some(list) => println!("  senders: {}", list.join(", ")),
            None => println!("  senders: (none)"),
        }
    }

    // Banks recognized by sender but without a layout rewrite
    for (bank, list) in domains {
        println!("{}", bank);
        println!("  layout:  (model reads the summary unaided)");
        println!("  senders: {}", list.join(", "));
    }

    Ok(())
}

/// Where prompt and lookup table overrides are read from
pub fn cmd_prompts_path() -> Result<()> {
    let show = |label: &str, path: Option<std::path::PathBuf>| match path {
        Some(path) => {
            let state = if path.exists() { "" } else { " (not created)" };
            println!("{:<8} {}{}", label, path.display(), state);
        }
        None => println!("{:<8} (no data directory on this system)", label),
    };

    show("prompts", default_prompts_dir());
    show("tables", default_tables_path());
    Ok(())
}
