use clap::Parser;
use k_restore::backup::backup_config::BackupConfig;
use k_restore::backup::result_error::error::Error;
use k_restore::backup::result_error::WithMsg;
use std::fs::File;
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, info};

/// Create restore points of a backup job and prune the old ones
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long)]
    config: PathBuf,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let res = File::open(&args.config)
        .map_err(Error::from)
        .and_then(|f| {
            serde_yml::from_reader::<_, BackupConfig>(f)
                .map_err(Error::from)
                .with_msg(format!("Parse YAML config failed: {:?}", &args.config))
        })
        .and_then(|bc| {
            bc.validate_all()
                .map_err(Error::from)
                .map(|_| bc)
                .with_msg(format!("Config validation failed: {:?}", &args.config))
        })
        .and_then(|bc| bc.start_loop());

    match res {
        Ok(_) => info!("Backup run finished"),
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    }
}
