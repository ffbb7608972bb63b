use std::error::Error;
use std::path::PathBuf;

use assay_arch::{load_archive, save_archive};
use assay_proc::Show;
use clap::{Args, ValueEnum};
use tracing::info;

use super::load_options;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ShowArg {
    Raw,
    NormFree,
    NormConstrained,
}

impl From<ShowArg> for Show {
    fn from(arg: ShowArg) -> Self {
        match arg {
            ShowArg::Raw => Show::Raw,
            ShowArg::NormFree => Show::NormFree,
            ShowArg::NormConstrained => Show::NormConstrained,
        }
    }
}

#[derive(Args, Debug)]
pub struct RefitArgs {
    /// Processed archive (.zip).
    #[arg(long)]
    pub archive: PathBuf,
    /// Plate id of the sample.
    #[arg(long)]
    pub plate: String,
    /// Sample id.
    #[arg(long)]
    pub sample: String,
    /// Concentration index to mask or restore.
    #[arg(long)]
    pub point: Option<usize>,
    /// Fit to display for the sample.
    #[arg(long, value_enum)]
    pub show: Option<ShowArg>,
    /// Archive written with the change; defaults to overwriting the input.
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Directory used to unpack the archive instead of ~/.assay/scratch.
    #[arg(long)]
    pub scratch: Option<PathBuf>,
}

pub fn run(args: &RefitArgs) -> Result<(), Box<dyn Error>> {
    if args.point.is_none() && args.show.is_none() {
        return Err("nothing to do: pass --point and/or --show".into());
    }
    let loaded = load_archive(&args.archive, &load_options(&args.scratch))?;
    let mut container = loaded
        .container
        .ok_or_else(|| format!("{} holds no processed plates", args.archive.display()))?;
    let plate = container
        .plates
        .iter()
        .position(|plate| plate.plate_id == args.plate)
        .ok_or_else(|| format!("plate {} not found", args.plate))?;

    if let Some(point) = args.point {
        match container.toggle_point(plate, &args.sample, point) {
            Some(excluded) => info!(sample = %args.sample, point, excluded, "point toggled"),
            None => {
                return Err(format!(
                    "point {point} of {} cannot be toggled (unknown sample or too few points left)",
                    args.sample
                )
                .into())
            }
        }
    }
    if let Some(show) = args.show {
        container
            .select_show(plate, &args.sample, show.into())
            .ok_or_else(|| format!("sample {} not found", args.sample))?;
    }

    let out = args.out.as_ref().unwrap_or(&args.archive);
    save_archive(out, &loaded.project, Some(&container))?;
    println!("archive written to {}", out.display());
    Ok(())
}
