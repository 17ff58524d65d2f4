//! Build automation tasks for RTM
//!
//! - Generating the CLI reference from the clap definitions

use anyhow::Context;
use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for RTM", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<rtm_cli::Cli>();

    let content = format!(
        r#"# RTM CLI Reference

Rucio Transfer Manager keeps track of a large number of Rucio transfers.
Datasets move through `new`, `subscribed`, `transferred` and `done`; any
failure moves them to `error`.

## Quick Start

```bash
# Register datasets from the file catalog
rtm define --site T2_CH_CERN /DoubleMuon/Run2016G-UL2016_MiniAODv2-v1/MINIAOD

# Or from a list
rtm define --file datasets.yaml

# Create replication rules
rtm subscribe

# Poll rule progress
rtm status 'Run2016*'

# Checksum transferred files
rtm verify

# Totals per state
rtm summary
```

`datasets.yaml`:

```yaml
site: T2_CH_CERN
datasets:
  - /DoubleMuon/Run2016G-UL2016_MiniAODv2-v1/MINIAOD
  - /DoubleMuon/Run2016H-UL2016_MiniAODv2-v2/MINIAOD
```

## Commands

{}

## Configuration

`$XDG_CONFIG_HOME/RucioTransferManager/rtm.toml` is created from a template
on first use. Select another file with `--config` or `RTM_CONFIG`.

## Environment Variables

- `RTM_DB_URL` - SQLite database URL
- `RTM_MAX_DASGOCLIENT` - concurrent catalog queries
- `RTM_MAX_XRDADLER32` - concurrent checksum computations
- `RTM_LOG_LEVEL`, `RTM_LOG_FORMAT`, `RTM_LOG_DIR`, `RTM_LOG_FILTER` - logging

---

*Generated from the CLI source code. To update, run `cargo xtask generate-cli-docs`.*
"#,
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
