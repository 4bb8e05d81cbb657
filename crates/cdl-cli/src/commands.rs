use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde::Serialize;

use cdl_ledger::{Ledger, LedgerConfig, LedgerStats, NewDocument, NullAuditSink};
use cdl_server::{CdlServer, ServerConfig};
use cdl_types::{ConditionKind, ContractType, VerificationLevel, VerificationResult};

use crate::cli::{Cli, Command, DemoArgs, OutputFormat, ServeArgs};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args),
        Command::Demo(args) => cmd_demo(args, cli.format),
        Command::Config => cmd_config(),
    }
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    let server = CdlServer::new(config)?;
    println!(
        "{} CDL server on {} (difficulty {}, scheduler {})",
        "✓".green().bold(),
        server.config().bind_addr.to_string().bold(),
        server.config().ledger.difficulty,
        if server.config().seal_on_interval {
            "on".green()
        } else {
            "off".yellow()
        }
    );
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server.serve())?;
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    print!("{}", ServerConfig::default().to_toml_string()?);
    Ok(())
}

#[derive(Debug, Serialize)]
struct DemoReport {
    document_id: String,
    before_seal: VerificationResult,
    contract_satisfied_before_seal: bool,
    block_index: u64,
    block_hash: String,
    after_seal: VerificationResult,
    contract_executed: bool,
    second_execution: bool,
    stats: LedgerStats,
}

fn run_demo(difficulty: u32) -> anyhow::Result<DemoReport> {
    let ledger = Ledger::builder(LedgerConfig::with_difficulty(difficulty))
        .audit(Arc::new(NullAuditSink))
        .build()?;

    let d1 = ledger.register_document(NewDocument::new(
        "birth_certificate",
        "CIT-1",
        "birth-cert-001",
        "civil-registry",
    ))?;
    let before_seal = ledger.verify_document(&d1.id);

    let contract = ledger.create_contract(
        ContractType::DocumentIssuance,
        vec![ConditionKind::DocumentVerified { document_id: d1.id }],
        "civil-registry",
    )?;
    let contract_satisfied_before_seal = ledger.evaluate_contract(&contract.id)?;

    let block = ledger
        .seal_pending_batch()?
        .context("pending queue was empty")?;
    let after_seal = ledger.verify_document(&d1.id);
    let contract_executed = ledger.try_execute_contract(&contract.id)?;
    let second_execution = ledger.try_execute_contract(&contract.id)?;

    Ok(DemoReport {
        document_id: d1.id.to_string(),
        before_seal,
        contract_satisfied_before_seal,
        block_index: block.index,
        block_hash: block.hash.to_hex(),
        after_seal,
        contract_executed,
        second_execution,
        stats: ledger.stats()?,
    })
}

fn cmd_demo(args: DemoArgs, format: OutputFormat) -> anyhow::Result<()> {
    let report = run_demo(args.difficulty)?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Registered {} for {}", report.document_id.yellow(), "CIT-1".bold());
    println!("  Before seal: {}", level(report.before_seal.level));
    println!(
        "  Contract satisfied: {}",
        report.contract_satisfied_before_seal.to_string().dimmed()
    );
    println!(
        "{} Sealed block {} {}",
        "✓".green().bold(),
        report.block_index.to_string().bold(),
        report.block_hash.cyan()
    );
    println!(
        "  After seal: {} ({}/5 checks)",
        level(report.after_seal.level),
        report.after_seal.passed
    );
    println!(
        "  Contract executed: {}, second attempt: {}",
        report.contract_executed.to_string().green(),
        report.second_execution.to_string().dimmed()
    );
    println!(
        "Chain: {} blocks, integrity {}",
        report.stats.chain_length.to_string().bold(),
        if report.stats.chain_intact {
            "✓".green()
        } else {
            "✗".red()
        }
    );
    Ok(())
}

fn level(level: VerificationLevel) -> colored::ColoredString {
    let text = level.to_string();
    match level {
        VerificationLevel::High => text.green().bold(),
        VerificationLevel::Medium => text.yellow(),
        VerificationLevel::Low => text.red(),
        VerificationLevel::Invalid => text.red().bold(),
    }
}
