//! `pctx context`: assemble and print a character's context for a query.

use anyhow::Result;

use crate::config::Config;
use crate::context::{ContextEngine, SourceCache};
use crate::db;

pub async fn run_context(
    config: &Config,
    character: &str,
    query: &str,
    budget: Option<usize>,
    reserve: Option<usize>,
    json: bool,
) -> Result<()> {
    let budget = budget.unwrap_or(config.budget.default_budget);
    let reserve = reserve.unwrap_or(config.budget.reserve_tokens);

    let pool = db::connect(config).await?;
    let engine = ContextEngine::new(pool.clone(), config);
    let mut cache = SourceCache::new();
    let bundle = engine
        .context_bundle(&mut cache, character, query, budget, reserve)
        .await;
    pool.close().await;
    let bundle = bundle?;

    if json {
        println!("{}", serde_json::to_string_pretty(&bundle)?);
        return Ok(());
    }

    if bundle.text.is_empty() {
        println!("(no context for {})", character);
    } else {
        println!("{}", bundle.text);
    }
    println!();

    let usage = &bundle.usage;
    println!("--- Usage ---");
    println!(
        "budget: {}  reserve: {}  used: {}  remaining: {}",
        usage.budget_tokens, usage.reserve_tokens, usage.used_tokens, usage.remaining_tokens
    );
    for doc in &usage.docs {
        println!(
            "  {:<10} {:>6} tokens  score={}{}  {}",
            doc.method,
            doc.used_tokens,
            doc.score,
            if doc.pinned { " pinned" } else { "" },
            doc.name
        );
    }
    Ok(())
}
