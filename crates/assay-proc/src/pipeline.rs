//! The processing pipeline.
//!
//! Plates run in declared order. Inside a plate every sample record is
//! built independently on a rayon pool and re-assembled by index, so the
//! container does not depend on the thread count. A plate whose raw file
//! no reader recognises is skipped with a [`PlateWarning`]; every other
//! error aborts the run.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use assay_core::plate::index_to_well;
use assay_core::stats::nanmean;
use assay_core::{AssayError, ErrorInfo};
use assay_fit::thermal::{self, baseline};
use assay_fit::{delta_tm, fit_melt, initial_velocity, sigmoidal, Window};
use assay_layout::{
    parse_transfer, resolve_plate, Entity, Layout, ParsedTransfer, ResolvedPlate, ResolvedWell,
    WellType,
};
use assay_read::{check_supported, read_raw, RawSignal, ReadContext};
use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, info, warn};

use crate::container::{Container, PlateRecord, PlateWarning, SampleMeta};
use crate::family::{AssayFamily, FamilyKind};
use crate::processed::{Processed, SampleRecord, Show};
use crate::project::{AssayCategory, PlateSpec, Project, SampleSource};
use crate::references::{compute_references, References};

/// Normalised means outside this band are flagged.
const PLAUSIBLE_RANGE: (f64, f64) = (-20.0, 120.0);

/// Reported as each sample record of a plate is fitted, and once more
/// when the plate is finished with `samples_done == samples_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Zero-based plate index.
    pub plate: usize,
    pub plates_total: usize,
    pub samples_done: usize,
    /// Sample records of the plate; 0 when it was skipped.
    pub samples_total: usize,
}

/// Pipeline options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOpts {
    /// Worker threads of the per-sample fit pool.
    pub concurrency: usize,
}

impl Default for PipelineOpts {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

struct PlateContext<'a> {
    project: &'a Project,
    family: FamilyKind,
    transfer: Option<&'a ParsedTransfer>,
    shared_layout: Option<&'a Arc<Layout>>,
    pool: &'a ThreadPool,
}

/// Processes every plate of `project`.
///
/// Returns `Ok(None)` when `cancel` was raised; the flag is checked at
/// every plate boundary and no partial container is ever returned.
pub fn run_pipeline(
    project: &Project,
    opts: &PipelineOpts,
    cancel: &AtomicBool,
    progress: &mut dyn FnMut(Progress),
) -> Result<Option<Container>, AssayError> {
    project.validate()?;
    let details = &project.details;
    let family = FamilyKind::for_details(details);
    info!(
        assay = %details.assay_type,
        ?family,
        plates = project.plates.len(),
        "processing project"
    );

    let transfer = match (details.sample_source, &project.transfer_file) {
        (SampleSource::Echo, Some(path)) => {
            Some(parse_transfer(path, &project.transfer_rules, details.format)?)
        }
        _ => None,
    };
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.concurrency.max(1))
        .build()
        .map_err(|err| AssayError::config("pipeline.thread_pool", err.to_string()))?;
    let shared_layout = if details.global_layout {
        project.layout.clone().map(Arc::new)
    } else {
        None
    };
    let ctx = PlateContext {
        project,
        family,
        transfer: transfer.as_ref(),
        shared_layout: shared_layout.as_ref(),
        pool: &pool,
    };

    let mut container = Container::new(family, details.category);
    let plates_total = project.plates.len();
    for (index, spec) in project.plates.iter().enumerate() {
        if cancel.load(Ordering::SeqCst) {
            info!(plate = index, "processing cancelled");
            return Ok(None);
        }
        let mut on_sample = |samples_done, samples_total| {
            progress(Progress {
                plate: index,
                plates_total,
                samples_done,
                samples_total,
            })
        };
        match process_plate(&ctx, index, spec, &mut on_sample) {
            Ok(record) => {
                let samples = record.processed.records.len();
                progress(Progress {
                    plate: index,
                    plates_total,
                    samples_done: samples,
                    samples_total: samples,
                });
                container.plates.push(record);
            }
            Err(err @ AssayError::ParseMismatch(_)) => {
                warn!(plate = index, destination = %spec.destination, error = %err, "skipping plate");
                progress(Progress {
                    plate: index,
                    plates_total,
                    samples_done: 0,
                    samples_total: 0,
                });
                container.warnings.push(PlateWarning {
                    index,
                    destination: spec.destination.clone(),
                    error: err,
                });
            }
            Err(err) => return Err(err),
        }
    }
    if cancel.load(Ordering::SeqCst) {
        info!("processing cancelled");
        return Ok(None);
    }
    info!(
        plates = container.plates.len(),
        skipped = container.warnings.len(),
        results = container.result_count(),
        "project processed"
    );
    Ok(Some(container))
}

fn process_plate(
    ctx: &PlateContext<'_>,
    index: usize,
    spec: &PlateSpec,
    on_sample: &mut dyn FnMut(usize, usize),
) -> Result<PlateRecord, AssayError> {
    let project = ctx.project;
    let details = &project.details;
    let fmt = details.format;
    check_supported(&spec.data_file)?;

    let plate_id = if spec.plate_id.trim().is_empty() {
        spec.destination.clone()
    } else {
        spec.plate_id.clone()
    };
    let read_ctx = ReadContext {
        fmt,
        rules: project.raw_rules.as_ref(),
        plate_id: details.use_plate_id.then_some(plate_id.as_str()),
        position: index,
    };
    let raw = read_raw(details.device, &spec.data_file, &read_ctx).ok_or_else(|| {
        AssayError::ParseMismatch(
            ErrorInfo::new("pipeline.raw_unreadable", "raw data not recognised")
                .with_context("device", details.device.name())
                .with_context("path", spec.data_file.display().to_string()),
        )
    })?;

    let user = project.layout_for(index);
    let valid = |well: usize| raw.is_valid(well);
    let resolved = match details.sample_source {
        SampleSource::Echo => {
            let transfers = ctx.transfer.and_then(|t| t.layout.plate(&spec.destination));
            if transfers.is_none() {
                warn!(destination = %spec.destination, "no transfers for plate");
            }
            resolve_plate(&plate_id, fmt, transfers, user, valid, &project.transfer_rules)?
        }
        SampleSource::Capillary => {
            let inferred;
            let user = match (user, &raw) {
                (Some(layout), _) => Some(layout),
                (None, RawSignal::Capillary(traces)) => {
                    inferred = capillary_layout(&plate_id, ctx, traces)?;
                    Some(&inferred)
                }
                (None, _) => None,
            };
            resolve_plate(&plate_id, fmt, None, user, valid, &project.transfer_rules)?
        }
        SampleSource::Well => resolve_plate(&plate_id, fmt, None, user, valid, &project.transfer_rules)?,
    };
    let layout = match ctx.shared_layout {
        Some(shared) if shared.wells == resolved.layout.wells => Arc::clone(shared),
        _ => Arc::new(resolved.layout.clone()),
    };

    let family = ctx.family.family();
    let category = details.category;
    let (references, records, samples) = match ctx.family {
        FamilyKind::ThermalShift => thermal_plate(ctx, &resolved, &layout, &raw, on_sample)?,
        FamilyKind::Rate => rate_plate(ctx, &resolved, &layout, &raw, category, on_sample)?,
        FamilyKind::Htrf | FamilyKind::Polarisation => {
            dose_plate(ctx.pool, family, category, &resolved, &layout, &raw, on_sample)?
        }
    };
    info!(
        plate = index,
        plate_id = %plate_id,
        samples = records.len(),
        zprime = references.zprime_mean,
        "plate processed"
    );

    Ok(PlateRecord {
        destination: spec.destination.clone(),
        format: fmt,
        data_file: spec.data_file.clone(),
        raw,
        samples,
        processed: Processed { records },
        layout,
        references,
        plate_id,
    })
}

/// Capillaries named like a reference become reference wells, the rest
/// samples named after the capillary.
fn capillary_layout(
    plate_id: &str,
    ctx: &PlateContext<'_>,
    traces: &[assay_read::CapillaryTrace],
) -> Result<Layout, AssayError> {
    let details = &ctx.project.details;
    let mut layout = Layout::new(plate_id, details.format);
    let mut samples: Vec<String> = Vec::new();
    for (well, trace) in traces.iter().enumerate() {
        let name = trace.name.trim();
        let entry = layout.entry_mut(well)?;
        if details
            .reference_names
            .iter()
            .any(|reference| reference.eq_ignore_ascii_case(name))
        {
            entry.well_type = WellType::Reference;
            entry.reference = Entity::named(0, name);
        } else if !name.is_empty() {
            let id = match samples.iter().position(|known| known == name) {
                Some(id) => id,
                None => {
                    samples.push(name.to_string());
                    samples.len() - 1
                }
            };
            entry.well_type = WellType::Sample;
            entry.sample = Entity::named(id, name);
        }
    }
    Ok(layout)
}

/// One sample of a plate, grouped into replicate sets.
struct SampleJob {
    sample_id: String,
    /// Descending, NaN last.
    concentrations: Vec<f64>,
    locations: Vec<Vec<usize>>,
    protein: Option<usize>,
}

fn well_concentration(well: &ResolvedWell) -> f64 {
    let finite: Vec<f64> = well
        .concentrations
        .iter()
        .copied()
        .filter(|c| c.is_finite())
        .collect();
    if finite.is_empty() {
        f64::NAN
    } else {
        finite.iter().sum()
    }
}

fn same_concentration(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || (a - b).abs() <= 1e-9 * a.abs().max(b.abs())
}

fn descending(a: f64, b: f64) -> std::cmp::Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => std::cmp::Ordering::Equal,
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        (false, false) => b.total_cmp(&a),
    }
}

fn sample_jobs(resolved: &ResolvedPlate, layout: &Layout) -> Vec<SampleJob> {
    resolved
        .sample_order
        .iter()
        .filter_map(|sample| {
            let wells = resolved.wells_of_sample(sample);
            let first = *wells.first()?;
            let mut groups: Vec<(f64, Vec<usize>)> = Vec::new();
            for well in wells {
                let conc = well_concentration(&resolved.wells[well]);
                match groups.iter_mut().find(|(c, _)| same_concentration(*c, conc)) {
                    Some((_, group)) => group.push(well),
                    None => groups.push((conc, vec![well])),
                }
            }
            groups.sort_by(|a, b| descending(a.0, b.0));
            Some(SampleJob {
                sample_id: sample.clone(),
                concentrations: groups.iter().map(|(c, _)| *c).collect(),
                locations: groups.into_iter().map(|(_, wells)| wells).collect(),
                protein: layout.entry(first).and_then(|entry| entry.protein.id),
            })
        })
        .collect()
}

fn sample_meta(job: &SampleJob, resolved: &ResolvedPlate) -> SampleMeta {
    let wells: Vec<usize> = job.locations.iter().flatten().copied().collect();
    SampleMeta {
        sample_id: job.sample_id.clone(),
        concentrations: wells.iter().map(|w| well_concentration(&resolved.wells[*w])).collect(),
        volumes: wells
            .iter()
            .map(|w| resolved.wells[*w].volumes.iter().copied().filter(|v| v.is_finite()).sum())
            .collect(),
        wells,
    }
}

/// Builds one record per job on `pool`, returned in job order.
///
/// `on_sample(done, total)` runs on the calling thread once per finished
/// record, in completion order.
fn run_jobs<J, F>(
    pool: &ThreadPool,
    jobs: &[J],
    on_sample: &mut dyn FnMut(usize, usize),
    build: F,
) -> Vec<SampleRecord>
where
    J: Sync,
    F: Fn(&J) -> SampleRecord + Sync + Send,
{
    let total = jobs.len();
    let (sender, finished) = mpsc::channel::<()>();
    let mut ordered: Vec<(usize, SampleRecord)> = thread::scope(|scope| {
        let worker = scope.spawn(|| {
            pool.install(|| {
                jobs.par_iter()
                    .enumerate()
                    .map_with(sender, |sender, (index, job)| {
                        let record = build(job);
                        let _ = sender.send(());
                        (index, record)
                    })
                    .collect::<Vec<_>>()
            })
        });
        // Ends once every sender clone is dropped with the parallel pass.
        for (done, ()) in finished.iter().enumerate() {
            on_sample(done + 1, total);
        }
        worker
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
    });
    ordered.sort_by_key(|(index, _)| *index);
    ordered.into_iter().map(|(_, record)| record).collect()
}

/// Normalises every replicate, then averages; flags and masks points.
fn normalise_record(record: &mut SampleRecord, family: &dyn AssayFamily, refs: &References) {
    for (i, group) in record.raw_data.iter().enumerate() {
        let norm = family.normalise(group, refs);
        record.norm[i] = nanmean(&norm);
        record.norm_sem[i] = assay_core::stats::nansem(&norm);
    }
    record.excluded = record.raw.iter().map(|v| !v.is_finite()).collect();
    record.derived.out_of_range = record
        .norm
        .iter()
        .map(|v| v.is_finite() && (*v < PLAUSIBLE_RANGE.0 || *v > PLAUSIBLE_RANGE.1))
        .collect();
}

fn finish_record(record: &mut SampleRecord, family: &dyn AssayFamily, category: AssayCategory) {
    if category.fits_curves() {
        family.fit(record);
    } else {
        record.show = Show::Raw;
    }
}

type PlateParts = (References, Vec<SampleRecord>, Vec<SampleMeta>);

fn signal_shape(expected: &str, raw: &RawSignal) -> AssayError {
    let found = match raw {
        RawSignal::Scalar(_) => "scalar",
        RawSignal::Series(_) => "series",
        RawSignal::Capillary(_) => "capillary",
    };
    AssayError::ParseMismatch(
        ErrorInfo::new("pipeline.signal_shape", "raw data shape does not suit the assay")
            .with_context("expected", expected)
            .with_context("found", found),
    )
}

fn dose_plate(
    pool: &ThreadPool,
    family: &dyn AssayFamily,
    category: AssayCategory,
    resolved: &ResolvedPlate,
    layout: &Layout,
    raw: &RawSignal,
    on_sample: &mut dyn FnMut(usize, usize),
) -> Result<PlateParts, AssayError> {
    if !matches!(raw, RawSignal::Scalar(_)) {
        return Err(signal_shape("scalar", raw));
    }
    let values: Vec<f64> = (0..resolved.format.wells()).map(|w| raw.scalar(w)).collect();
    let refs = compute_references(layout, &values);
    let jobs = sample_jobs(resolved, layout);
    let records = run_jobs(pool, &jobs, on_sample, |job| {
        let raw_data = job
            .locations
            .iter()
            .map(|group| group.iter().map(|w| values[*w]).collect())
            .collect();
        let mut record = SampleRecord::new(
            job.sample_id.clone(),
            job.concentrations.clone(),
            job.locations.clone(),
            raw_data,
            sigmoidal::PARAMS,
        );
        record.derived.protein = job.protein;
        normalise_record(&mut record, family, &refs);
        finish_record(&mut record, family, category);
        record
    });
    let samples = jobs.iter().map(|job| sample_meta(job, resolved)).collect();
    Ok((refs, records, samples))
}

/// `sqrt(Σ eᵢ²) / n` over the finite errors of one replicate set.
fn propagated_error(errors: &[f64]) -> f64 {
    let finite: Vec<f64> = errors.iter().copied().filter(|e| e.is_finite()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    finite.iter().map(|e| e * e).sum::<f64>().sqrt() / finite.len() as f64
}

fn rate_plate(
    ctx: &PlateContext<'_>,
    resolved: &ResolvedPlate,
    layout: &Layout,
    raw: &RawSignal,
    category: AssayCategory,
    on_sample: &mut dyn FnMut(usize, usize),
) -> Result<PlateParts, AssayError> {
    let RawSignal::Series(series) = raw else {
        return Err(signal_shape("series", raw));
    };
    let family = ctx.family.family();
    let window = ctx.project.details.rate_window;

    // References are always taken over the fixed default window.
    let reference_wells: Vec<usize> = (0..resolved.format.wells())
        .filter(|w| {
            matches!(
                layout.well_type(*w),
                WellType::Reference | WellType::Buffer | WellType::Control
            )
        })
        .collect();
    let reference_velocities: Vec<(usize, f64)> = ctx.pool.install(|| {
        reference_wells
            .par_iter()
            .map(|well| {
                let v = series
                    .get(well)
                    .map(|s| initial_velocity(&s.x, &s.y, Window::default()).v)
                    .unwrap_or(f64::NAN);
                (*well, v)
            })
            .collect()
    });
    let mut values = vec![f64::NAN; resolved.format.wells()];
    for (well, v) in reference_velocities {
        values[well] = v;
    }
    let refs = compute_references(layout, &values);
    debug!(
        solvent = refs.solvent.mean,
        control = refs.control.mean,
        "reference velocities"
    );

    let jobs = sample_jobs(resolved, layout);
    let records = run_jobs(ctx.pool, &jobs, on_sample, |job| {
        let mut raw_data = Vec::with_capacity(job.locations.len());
        let mut errors = Vec::with_capacity(job.locations.len());
        for group in &job.locations {
            let fits: Vec<(f64, f64)> = group
                .iter()
                .map(|well| match series.get(well) {
                    Some(s) => {
                        let velocity = initial_velocity(&s.x, &s.y, window);
                        (velocity.v, velocity.error)
                    }
                    None => (f64::NAN, f64::NAN),
                })
                .collect();
            raw_data.push(fits.iter().map(|(v, _)| *v).collect::<Vec<f64>>());
            errors.push(propagated_error(&fits.iter().map(|(_, e)| *e).collect::<Vec<f64>>()));
        }
        let mut record = SampleRecord::new(
            job.sample_id.clone(),
            job.concentrations.clone(),
            job.locations.clone(),
            raw_data,
            sigmoidal::PARAMS,
        );
        record.derived.protein = job.protein;
        record.derived.velocities = record.raw.clone();
        record.derived.velocity_errors = errors;
        normalise_record(&mut record, family, &refs);
        finish_record(&mut record, family, category);
        record
    });
    let samples = jobs.iter().map(|job| sample_meta(job, resolved)).collect();
    Ok((refs, records, samples))
}

struct MeltJob {
    name: String,
    well: usize,
    reference: bool,
    protein: Option<usize>,
    concentration: f64,
    temps: Vec<f64>,
    signal: Vec<f64>,
}

fn melt_name(resolved: &ResolvedPlate, layout: &Layout, raw: &RawSignal, well: usize) -> String {
    if let Some(sample) = &resolved.wells[well].sample {
        return sample.clone();
    }
    if let Some(entry) = layout.entry(well) {
        if entry.well_type == WellType::Reference && !entry.reference.name.is_empty() {
            return entry.reference.name.clone();
        }
    }
    let from_signal = match raw {
        RawSignal::Series(series) => series.get(&well).and_then(|s| s.label.clone()),
        RawSignal::Capillary(traces) => traces.get(well).map(|t| t.name.clone()),
        RawSignal::Scalar(_) => None,
    };
    from_signal
        .filter(|name| !name.trim().is_empty())
        .or_else(|| index_to_well(well, resolved.format).ok())
        .unwrap_or_else(|| well.to_string())
}

/// One record per well with a melt trace. Reference wells set the
/// per-protein baseline every ΔTm is taken against.
fn thermal_plate(
    ctx: &PlateContext<'_>,
    resolved: &ResolvedPlate,
    layout: &Layout,
    raw: &RawSignal,
    on_sample: &mut dyn FnMut(usize, usize),
) -> Result<PlateParts, AssayError> {
    let trace = |well: usize| -> Option<(Vec<f64>, Vec<f64>)> {
        match raw {
            RawSignal::Series(series) => series.get(&well).map(|s| (s.x.clone(), s.y.clone())),
            RawSignal::Capillary(traces) => traces
                .get(well)
                .map(|t| (t.temperature.clone(), t.ratio.clone())),
            RawSignal::Scalar(_) => None,
        }
    };
    if matches!(raw, RawSignal::Scalar(_)) {
        return Err(signal_shape("series", raw));
    }
    let family = ctx.family.family();

    let mut jobs = Vec::new();
    for well in 0..resolved.format.wells() {
        let well_type = layout.well_type(well);
        if well_type == WellType::Unassigned || !raw.is_valid(well) {
            continue;
        }
        let Some((temps, signal)) = trace(well) else {
            continue;
        };
        jobs.push(MeltJob {
            name: melt_name(resolved, layout, raw, well),
            well,
            reference: well_type == WellType::Reference,
            protein: layout.entry(well).and_then(|entry| entry.protein.id),
            concentration: well_concentration(&resolved.wells[well]),
            temps,
            signal,
        });
    }
    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    for job in &jobs {
        *seen.entry(job.name.as_str()).or_default() += 1;
    }
    let duplicated: Vec<bool> = jobs.iter().map(|job| seen[job.name.as_str()] > 1).collect();

    let unscaled = References::default();
    let mut records = run_jobs(ctx.pool, &jobs, on_sample, |job| {
        let scaled = family.normalise(&job.signal, &unscaled);
        let melt = fit_melt(&job.temps, &scaled);
        let mut record = SampleRecord::new(
            job.name.clone(),
            vec![job.concentration],
            vec![vec![job.well]],
            vec![vec![melt.tm()]],
            thermal::PARAMS,
        );
        record.raw_fit = melt.fit;
        record.derived.tm = record.raw[0];
        record.derived.protein = job.protein;
        record.excluded = vec![!record.derived.tm.is_finite()];
        record
    });
    for (record, (job, dup)) in records.iter_mut().zip(jobs.iter().zip(&duplicated)) {
        if *dup {
            let label = index_to_well(job.well, resolved.format)?;
            record.sample_id = format!("{} [{label}]", job.name);
        }
    }

    let mut reference_tms: BTreeMap<Option<usize>, Vec<f64>> = BTreeMap::new();
    for (record, job) in records.iter().zip(&jobs) {
        if job.reference {
            reference_tms.entry(job.protein).or_default().push(record.derived.tm);
        }
    }
    let baselines: BTreeMap<Option<usize>, f64> = reference_tms
        .iter()
        .map(|(protein, tms)| (*protein, baseline(tms)))
        .collect();
    for record in &mut records {
        let base = baselines
            .get(&record.derived.protein)
            .copied()
            .unwrap_or(f64::NAN);
        record.derived.delta_tm = delta_tm(record.derived.tm, base);
        record.norm = vec![record.derived.delta_tm];
        family.fit(record);
    }
    if baselines.is_empty() && !records.is_empty() {
        debug!("no reference wells; ΔTm is not available");
    }

    let mut tms = vec![f64::NAN; resolved.format.wells()];
    for record in &records {
        if let Some(well) = record.locations.first().and_then(|group| group.first()) {
            tms[*well] = record.derived.tm;
        }
    }
    let refs = compute_references(layout, &tms);
    let samples = records
        .iter()
        .zip(&jobs)
        .map(|(record, job)| SampleMeta {
            sample_id: record.sample_id.clone(),
            wells: vec![job.well],
            concentrations: vec![job.concentration],
            volumes: vec![resolved.wells[job.well].volumes.iter().copied().filter(|v| v.is_finite()).sum()],
        })
        .collect();
    Ok((refs, records, samples))
}

/// A pipeline run on its own thread.
///
/// Progress arrives on [`PipelineHandle::progress`]; [`cancel`] makes the
/// worker stop at the next plate boundary and [`join`] yield `Ok(None)`.
///
/// [`cancel`]: PipelineHandle::cancel
/// [`join`]: PipelineHandle::join
pub struct PipelineHandle {
    cancel: Arc<AtomicBool>,
    progress: Receiver<Progress>,
    worker: JoinHandle<Result<Option<Container>, AssayError>>,
}

impl PipelineHandle {
    pub fn spawn(project: Project, opts: PipelineOpts) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let (sender, progress) = mpsc::channel();
        let worker = thread::spawn(move || {
            run_pipeline(&project, &opts, &flag, &mut |step| {
                // A dropped receiver only means nobody is watching.
                let _ = sender.send(step);
            })
        });
        Self {
            cancel,
            progress,
            worker,
        }
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn progress(&self) -> &Receiver<Progress> {
        &self.progress
    }

    /// Waits for the worker.
    pub fn join(self) -> Result<Option<Container>, AssayError> {
        self.worker.join().map_err(|_| {
            AssayError::Io(ErrorInfo::new(
                "pipeline.worker",
                "processing thread panicked",
            ))
        })?
    }
}
