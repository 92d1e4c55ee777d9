use anyhow::{bail, Context};
use colored::Colorize;
use serde::Serialize;
use tracing::debug;

use gvault_archive::{Archive, ArchiveConfig, CancelToken, Problem, VerifyScope};
use gvault_types::{Kind, ObjectIdentity, ObjectRef, TopologyRef};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Init(args) => cmd_init(args, format),
        Command::Stats(args) => cmd_stats(args, format),
        Command::List(args) => cmd_list(args, format),
        Command::Show(args) => cmd_show(args, format),
        Command::Verify(args) => cmd_verify(args, format),
        Command::Compact(args) => cmd_compact(args, format),
        Command::Rebuild(args) => cmd_rebuild(args, format),
    }
}

fn open(path: &std::path::Path) -> anyhow::Result<Archive> {
    debug!(path = %path.display(), "opening archive");
    Archive::open(path).with_context(|| format!("opening archive at {}", path.display()))
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_init(args: InitArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = ArchiveConfig {
        sync_on_flush: !args.no_sync,
        ..ArchiveConfig::default()
    };
    let archive = Archive::create_with_config(&args.path, config.clone())
        .with_context(|| format!("creating archive at {}", args.path.display()))?;
    archive.close()?;
    match format {
        OutputFormat::Json => print_json(&config),
        OutputFormat::Text => {
            println!(
                "{} Initialized GeoVault archive in {}",
                "✓".green().bold(),
                args.path.display().to_string().bold()
            );
            println!("  Format: v{}", config.format_version);
            println!("  Quantization: v{}", config.quantization_version);
            Ok(())
        }
    }
}

fn cmd_stats(args: ArchiveArgs, format: OutputFormat) -> anyhow::Result<()> {
    let archive = open(&args.path)?;
    let stats = archive.stats()?;
    drop(archive);
    if format == OutputFormat::Json {
        return print_json(&stats);
    }

    println!("{:<30} {:>8} {:>12} {:>8}", "KIND".bold(), "OBJECTS", "BYTES", "REFS");
    for k in &stats.kinds {
        let objects = if k.unreferenced > 0 {
            format!("{} ({} free)", k.objects, k.unreferenced).yellow()
        } else {
            k.objects.to_string().normal()
        };
        println!(
            "{:<30} {:>8} {:>12} {:>8}",
            k.kind.name().cyan(),
            objects,
            k.payload_bytes,
            k.references
        );
    }
    println!();
    for f in &stats.families {
        println!(
            "  {:<14} {:>8} objects  {:>12} bytes on disk",
            f.family.name(),
            f.objects,
            f.segment_bytes
        );
    }
    println!(
        "\nTotal: {} objects, {} bytes, {} reclaimable",
        stats.objects().to_string().bold(),
        stats.segment_bytes(),
        stats.reclaimable_bytes().to_string().yellow()
    );
    Ok(())
}

#[derive(Serialize)]
struct Listed {
    identity: String,
    kind: Kind,
    ref_count: u64,
    bytes: u64,
    created_at: u64,
    references: Vec<String>,
}

fn cmd_list(args: ListArgs, format: OutputFormat) -> anyhow::Result<()> {
    let archive = open(&args.path)?;
    let entries = archive.entries()?;
    drop(archive);
    let listed: Vec<Listed> = entries
        .into_iter()
        .filter(|e| args.family.map_or(true, |f| e.family() == f))
        .map(|e| Listed {
            identity: e.identity.to_hex(),
            kind: e.kind(),
            ref_count: e.ref_count,
            bytes: e.locator.length,
            created_at: e.created_at,
            references: e.references.iter().map(ObjectIdentity::to_hex).collect(),
        })
        .collect();

    if format == OutputFormat::Json {
        return print_json(&listed);
    }
    for item in &listed {
        let refs = format!("refs={}", item.ref_count);
        println!(
            "{} {:<28} {} {} bytes",
            item.identity.yellow(),
            item.kind.name(),
            if item.ref_count == 0 { refs.red() } else { refs.green() },
            item.bytes
        );
    }
    if listed.is_empty() {
        println!("No objects.");
    }
    Ok(())
}

fn cmd_show(args: ShowArgs, format: OutputFormat) -> anyhow::Result<()> {
    let identity = ObjectIdentity::from_hex(&args.identity)
        .with_context(|| format!("parsing identity {:?}", args.identity))?;
    let archive = open(&args.path)?;
    let ref_count = archive.reference_count(&identity)?;

    let result = match TopologyRef::new(identity) {
        Some(topology) => {
            let record = archive.topology_record(&topology)?;
            match format {
                OutputFormat::Json => print_json(&record),
                OutputFormat::Text => {
                    println!("{} {} (refs={ref_count})", "Topology".bold(), identity);
                    for entry in record.entries() {
                        println!("  {:<24} {}", entry.role.as_str().cyan(), entry.reference);
                    }
                    Ok(())
                }
            }
        }
        None => {
            let entity = archive.get(&ObjectRef::new(identity))?;
            match format {
                OutputFormat::Json => print_json(&entity),
                OutputFormat::Text => {
                    println!("{} {} (refs={ref_count})", identity.kind().name().bold(), identity);
                    println!("{entity:#?}");
                    Ok(())
                }
            }
        }
    };
    drop(archive);
    result
}

fn cmd_verify(args: VerifyArgs, format: OutputFormat) -> anyhow::Result<()> {
    let scope = args.sample.map_or(VerifyScope::All, VerifyScope::Sample);
    let archive = open(&args.path)?;
    let report = archive.verify(scope, &CancelToken::new())?;
    drop(archive);

    if format == OutputFormat::Json {
        print_json(&report)?;
    } else if report.is_clean() {
        println!(
            "{} {} of {} objects verified",
            "✓".green().bold(),
            report.checked,
            report.total
        );
    } else {
        for issue in &report.issues {
            let detail = match &issue.problem {
                Problem::CorruptPayload { reason } => format!("corrupt payload: {reason}"),
                Problem::ManifestInconsistent { reason } => {
                    format!("manifest inconsistent: {reason}")
                }
                Problem::DanglingReference { missing } => format!("refers to missing {missing}"),
            };
            println!("{} {} {}", "✗".red().bold(), issue.identity.to_string().yellow(), detail);
        }
    }
    if !report.is_clean() {
        bail!("{} problem(s) found", report.issues.len());
    }
    Ok(())
}

fn cmd_compact(args: ArchiveArgs, format: OutputFormat) -> anyhow::Result<()> {
    let archive = open(&args.path)?;
    let report = archive.compact(&CancelToken::new())?;
    archive.close()?;
    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            println!(
                "{} Compacted: {} objects removed, {} → {} bytes",
                "✓".green().bold(),
                report.dropped,
                report.bytes_before,
                report.bytes_after.to_string().bold()
            );
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct Rebuilt {
    objects: usize,
    deltas: usize,
    duplicates: usize,
    orphan_deltas: usize,
    corrupt: Vec<String>,
    truncated: Vec<String>,
}

fn cmd_rebuild(args: ArchiveArgs, format: OutputFormat) -> anyhow::Result<()> {
    let (archive, report) = Archive::recover(&args.path)
        .with_context(|| format!("rebuilding archive at {}", args.path.display()))?;
    archive.close()?;

    let rebuilt = Rebuilt {
        objects: report.summary.objects,
        deltas: report.summary.deltas,
        duplicates: report.summary.duplicates,
        orphan_deltas: report.summary.orphan_deltas,
        corrupt: report
            .corrupt
            .iter()
            .map(|(family, c)| format!("{family} @{}: {}", c.offset, c.reason))
            .collect(),
        truncated: report
            .truncated
            .iter()
            .map(|(family, at)| format!("{family} @{at}"))
            .collect(),
    };
    if format == OutputFormat::Json {
        return print_json(&rebuilt);
    }

    println!(
        "{} Manifest rebuilt: {} objects, {} reference updates",
        "✓".green().bold(),
        rebuilt.objects,
        rebuilt.deltas
    );
    for line in &rebuilt.corrupt {
        println!("  {} skipped {}", "!".yellow().bold(), line);
    }
    for line in &rebuilt.truncated {
        println!("  {} torn tail cut at {}", "!".yellow().bold(), line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn run(args: &[&str]) -> anyhow::Result<()> {
        run_command(Cli::try_parse_from(args).unwrap())
    }

    #[test]
    fn init_then_inspect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault");
        let path = path.to_str().unwrap();

        run(&["gvault", "init", path, "--no-sync"]).unwrap();
        run(&["gvault", "stats", path]).unwrap();
        run(&["gvault", "list", path, "--format", "json"]).unwrap();
        run(&["gvault", "verify", path]).unwrap();
        run(&["gvault", "compact", path]).unwrap();
        run(&["gvault", "rebuild", path]).unwrap();
        assert!(run(&["gvault", "init", path]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn inspecting_leaves_manifest_alone() {
        use std::os::unix::fs::MetadataExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap();
        run(&["gvault", "init", path, "--no-sync"]).unwrap();
        let manifest = dir.path().join(gvault_archive::MANIFEST_FILE);
        let before = std::fs::metadata(&manifest).unwrap();

        run(&["gvault", "stats", path]).unwrap();
        run(&["gvault", "list", path]).unwrap();
        run(&["gvault", "verify", path]).unwrap();

        let after = std::fs::metadata(&manifest).unwrap();
        assert_eq!(after.ino(), before.ino());
        assert_eq!(after.modified().unwrap(), before.modified().unwrap());

        // Mutating commands still persist a fresh manifest.
        run(&["gvault", "compact", path]).unwrap();
        assert_ne!(std::fs::metadata(&manifest).unwrap().ino(), before.ino());
    }

    #[test]
    fn show_unknown_identity_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap();
        run(&["gvault", "init", path]).unwrap();
        assert!(run(&["gvault", "show", path, "not-hex"]).is_err());

        let missing = ObjectIdentity::new(Kind::Plane, gvault_types::Digest::from_hash([7; 32]));
        assert!(run(&["gvault", "show", path, &missing.to_hex()]).is_err());
    }
}
