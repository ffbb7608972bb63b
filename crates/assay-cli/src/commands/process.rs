use std::error::Error;
use std::path::PathBuf;

use assay_arch::save_archive;
use assay_proc::{upload_rows, write_results_csv, write_upload_csv, PipelineHandle, PipelineOpts, Project};
use clap::Args;
use tracing::{debug, info, warn};

#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Project YAML naming details, rule sets and plates.
    #[arg(long)]
    pub project: PathBuf,
    /// Archive written after processing (.zip).
    #[arg(long)]
    pub out: PathBuf,
    /// Threads fitting the samples of one plate.
    #[arg(long, default_value_t = 1)]
    pub threads: usize,
    /// Optional per-sample result table.
    #[arg(long)]
    pub results: Option<PathBuf>,
    /// Optional flat upload table.
    #[arg(long)]
    pub upload: Option<PathBuf>,
}

pub fn run(args: &ProcessArgs) -> Result<(), Box<dyn Error>> {
    let project = Project::load(&args.project)?;
    let opts = PipelineOpts {
        concurrency: args.threads.max(1),
    };
    let handle = PipelineHandle::spawn(project.clone(), opts);
    let mut finished = None;
    for step in handle.progress().iter() {
        debug!(
            plate = step.plate + 1,
            done = step.samples_done,
            of = step.samples_total,
            "sample fitted"
        );
        if step.samples_done == step.samples_total && finished != Some(step.plate) {
            finished = Some(step.plate);
            info!(
                plate = step.plate + 1,
                of = step.plates_total,
                samples = step.samples_total,
                "plate done"
            );
        }
    }
    let Some(container) = handle.join()? else {
        warn!("processing cancelled, nothing saved");
        return Ok(());
    };
    for warning in &container.warnings {
        warn!(
            plate = warning.index,
            destination = %warning.destination,
            code = %warning.error.info().code,
            "plate skipped"
        );
    }

    save_archive(&args.out, &project, Some(&container))?;
    println!("archive written to {}", args.out.display());
    if let Some(path) = &args.results {
        let rows = write_results_csv(&container, path)?;
        println!("{rows} result rows written to {}", path.display());
    }
    if let Some(path) = &args.upload {
        let rows = upload_rows(&container, &project.details);
        write_upload_csv(&rows, path)?;
        println!("{} upload rows written to {}", rows.len(), path.display());
    }
    Ok(())
}
