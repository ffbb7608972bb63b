use std::error::Error;
use std::path::PathBuf;

use assay_arch::load_archive;
use assay_proc::{upload_rows, write_results_csv, write_upload_csv};
use clap::Args;

use super::load_options;

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Processed archive (.zip).
    #[arg(long)]
    pub archive: PathBuf,
    /// Per-sample result table (.csv).
    #[arg(long)]
    pub out: PathBuf,
    /// Optional flat upload table.
    #[arg(long)]
    pub upload: Option<PathBuf>,
    /// Directory used to unpack the archive instead of ~/.assay/scratch.
    #[arg(long)]
    pub scratch: Option<PathBuf>,
}

pub fn run(args: &ExportArgs) -> Result<(), Box<dyn Error>> {
    let loaded = load_archive(&args.archive, &load_options(&args.scratch))?;
    let Some(container) = loaded.container else {
        return Err(format!("{} holds no processed plates", args.archive.display()).into());
    };
    let rows = write_results_csv(&container, &args.out)?;
    println!("{rows} result rows written to {}", args.out.display());
    if let Some(path) = &args.upload {
        let rows = upload_rows(&container, &loaded.project.details);
        write_upload_csv(&rows, path)?;
        println!("{} upload rows written to {}", rows.len(), path.display());
    }
    Ok(())
}
