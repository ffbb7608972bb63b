//! Project configuration: assay details, rule sets and the plate list.
//!
//! Details start from a per-assay template and are overridden by the
//! project file. Fields left empty are reported by [`Details::validate`].

use std::path::{Path, PathBuf};

use assay_core::plate::PlateFormat;
use assay_core::serde::load_yaml;
use assay_core::{AssayError, ErrorInfo};
use assay_fit::Window;
use assay_layout::{Layout, TransferRules};
use assay_read::{Device, RuleSet};
use serde::{Deserialize, Serialize};

/// What kind of read-out the assay produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssayCategory {
    #[default]
    DoseResponse,
    SingleDose,
    ThermalShift,
    Rate,
    Activity,
}

impl AssayCategory {
    /// Whether samples get a concentration-response fit.
    pub fn fits_curves(self) -> bool {
        matches!(self, AssayCategory::DoseResponse | AssayCategory::Rate)
    }
}

/// Where sample identities come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SampleSource {
    /// A liquid-handler transfer file.
    #[default]
    Echo,
    /// The capillary list of the raw file.
    Capillary,
    /// Well labels of the user layout only.
    Well,
}

fn default_device() -> Device {
    Device::Pherastar
}

fn default_solvent() -> String {
    "DMSO".to_string()
}

fn default_reference_names() -> Vec<String> {
    vec!["reference".to_string(), "ref".to_string()]
}

/// Assay metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Details {
    #[serde(default)]
    pub assay_type: String,
    #[serde(default)]
    pub category: AssayCategory,
    #[serde(default)]
    pub sample_source: SampleSource,
    #[serde(default)]
    pub format: PlateFormat,
    #[serde(default = "default_device")]
    pub device: Device,
    #[serde(default)]
    pub global_layout: bool,
    #[serde(default)]
    pub use_plate_id: bool,
    #[serde(default)]
    pub proteins: Vec<String>,
    #[serde(default)]
    pub substrates: Vec<String>,
    #[serde(default = "default_solvent")]
    pub solvent: String,
    #[serde(default)]
    pub solvent_concentration: f64,
    #[serde(default)]
    pub buffer: String,
    #[serde(default)]
    pub researcher: String,
    #[serde(default)]
    pub date: String,
    /// Capillary names treated as references.
    #[serde(default = "default_reference_names")]
    pub reference_names: Vec<String>,
    /// Stage-1 window of rate assays.
    #[serde(default)]
    pub rate_window: Window,
}

impl Default for Details {
    fn default() -> Self {
        Self {
            assay_type: String::new(),
            category: AssayCategory::default(),
            sample_source: SampleSource::default(),
            format: PlateFormat::default(),
            device: default_device(),
            global_layout: false,
            use_plate_id: false,
            proteins: Vec::new(),
            substrates: Vec::new(),
            solvent: default_solvent(),
            solvent_concentration: 0.0,
            buffer: String::new(),
            researcher: String::new(),
            date: String::new(),
            reference_names: default_reference_names(),
            rate_window: Window::default(),
        }
    }
}

impl Details {
    /// Built-in defaults for a known assay type.
    pub fn template(assay_type: &str) -> Self {
        let key = assay_type.trim().to_ascii_lowercase();
        let mut details = Details {
            assay_type: assay_type.trim().to_string(),
            ..Details::default()
        };
        match key.as_str() {
            "htrf" | "peptide_displacement" | "alphascreen" | "glo" => {
                details.device = Device::Pherastar;
            }
            "fp" | "tamra" | "polarisation" => {
                details.device = Device::Polarisation;
            }
            "nanodsf" => {
                details.category = AssayCategory::ThermalShift;
                details.sample_source = SampleSource::Capillary;
                details.device = Device::Nanodsf;
            }
            "qpcr_tsa" | "dsf" => {
                details.category = AssayCategory::ThermalShift;
                details.sample_source = SampleSource::Well;
                details.format = PlateFormat::Wells96;
                details.device = Device::Qpcr;
            }
            "rate" | "enzymatic" => {
                details.category = AssayCategory::Rate;
                details.device = Device::Timecourse;
            }
            "imaging" => {
                details.category = AssayCategory::Activity;
                details.device = Device::Imaging;
            }
            _ => {}
        }
        details
    }

    /// Names every required field that is still empty.
    pub fn validate(&self) -> Result<(), AssayError> {
        let mut missing = Vec::new();
        if self.assay_type.trim().is_empty() {
            missing.push("assay_type");
        }
        if self.proteins.iter().all(|p| p.trim().is_empty()) {
            missing.push("proteins");
        }
        if self.sample_source == SampleSource::Echo && self.solvent.trim().is_empty() {
            missing.push("solvent");
        }
        if missing.is_empty() {
            return Ok(());
        }
        Err(AssayError::MissingMetadata(
            ErrorInfo::new("details.missing", "required assay details are empty")
                .with_context("fields", missing.join(", ")),
        ))
    }
}

/// One plate of the project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateSpec {
    /// Destination barcode as written by the liquid handler.
    pub destination: String,
    pub data_file: PathBuf,
    #[serde(default)]
    pub plate_id: String,
    /// Per-plate layout; ignored when the details request a global one.
    #[serde(default)]
    pub layout: Option<Layout>,
}

/// Everything needed to run the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Project {
    #[serde(default)]
    pub details: Details,
    #[serde(default)]
    pub raw_rules: Option<RuleSet>,
    #[serde(default)]
    pub transfer_rules: TransferRules,
    #[serde(default)]
    pub transfer_file: Option<PathBuf>,
    #[serde(default)]
    pub raw_dir: Option<PathBuf>,
    #[serde(default)]
    pub plates: Vec<PlateSpec>,
    /// Layout repeated over every plate when `details.global_layout` is set.
    #[serde(default)]
    pub layout: Option<Layout>,
}

/// On-disk project: details may name a template to start from.
#[derive(Debug, Clone, Deserialize)]
struct ProjectFile {
    #[serde(default)]
    template: Option<PathBuf>,
    #[serde(default)]
    details: DetailsOverlay,
    #[serde(flatten)]
    project: Project,
}

impl Project {
    /// Loads a project YAML; a `template` key merges a details template
    /// underneath the file's own details.
    pub fn load(path: &Path) -> Result<Self, AssayError> {
        let file: ProjectFile = load_yaml(path)?;
        let mut project = file.project;
        let base = match file.template {
            Some(template) => {
                let template_path = match path.parent() {
                    Some(dir) if template.is_relative() => dir.join(template),
                    _ => template,
                };
                load_yaml(&template_path)?
            }
            None => Details::default(),
        };
        project.details = merge_details(base, file.details);
        project.resolve_paths(path.parent().unwrap_or_else(|| Path::new(".")));
        Ok(project)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(p) = self.transfer_file.as_mut() {
            anchor(p);
        }
        let raw_dir = self.raw_dir.clone();
        for plate in &mut self.plates {
            if plate.data_file.is_relative() {
                plate.data_file = match &raw_dir {
                    Some(dir) => dir.join(&plate.data_file),
                    None => base.join(&plate.data_file),
                };
            }
        }
        if let Some(p) = self.raw_dir.as_mut() {
            anchor(p);
        }
    }

    /// Layout used for plate `index`, if any.
    pub fn layout_for(&self, index: usize) -> Option<&Layout> {
        if self.details.global_layout {
            self.layout.as_ref()
        } else {
            self.plates.get(index).and_then(|plate| plate.layout.as_ref())
        }
    }

    /// Checks details and layouts before any plate is processed.
    pub fn validate(&self) -> Result<(), AssayError> {
        self.details.validate()?;
        if self.details.global_layout && self.layout.is_none() {
            return Err(AssayError::LayoutInconsistent(ErrorInfo::new(
                "project.global_layout",
                "global layout requested but none given",
            )));
        }
        if self.details.device == Device::Rules && self.raw_rules.is_none() {
            return Err(AssayError::config(
                "project.raw_rules",
                "the rules device needs raw data rules",
            ));
        }
        if self.details.sample_source == SampleSource::Echo && self.transfer_file.is_none() {
            return Err(AssayError::MissingMetadata(
                ErrorInfo::new("project.transfer_file", "echo sample source needs a transfer file")
                    .with_context("fields", "transfer_file"),
            ));
        }
        for index in 0..self.plates.len() {
            if let Some(layout) = self.layout_for(index) {
                if layout.format != self.details.format {
                    return Err(AssayError::LayoutInconsistent(
                        ErrorInfo::new("project.layout_format", "layout format differs from plate format")
                            .with_context("plate", index.to_string()),
                    ));
                }
                layout.validate()?;
            }
        }
        Ok(())
    }
}

/// Details as written in a project file: only the keys present are set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DetailsOverlay {
    pub assay_type: Option<String>,
    pub category: Option<AssayCategory>,
    pub sample_source: Option<SampleSource>,
    pub format: Option<PlateFormat>,
    pub device: Option<Device>,
    pub global_layout: Option<bool>,
    pub use_plate_id: Option<bool>,
    pub proteins: Option<Vec<String>>,
    pub substrates: Option<Vec<String>>,
    pub solvent: Option<String>,
    pub solvent_concentration: Option<f64>,
    pub buffer: Option<String>,
    pub researcher: Option<String>,
    pub date: Option<String>,
    pub reference_names: Option<Vec<String>>,
    pub rate_window: Option<Window>,
}

/// Every key set in `overlay` replaces the template value, including
/// values that happen to equal the built-in defaults.
pub fn merge_details(template: Details, overlay: DetailsOverlay) -> Details {
    Details {
        assay_type: overlay.assay_type.unwrap_or(template.assay_type),
        category: overlay.category.unwrap_or(template.category),
        sample_source: overlay.sample_source.unwrap_or(template.sample_source),
        format: overlay.format.unwrap_or(template.format),
        device: overlay.device.unwrap_or(template.device),
        global_layout: overlay.global_layout.unwrap_or(template.global_layout),
        use_plate_id: overlay.use_plate_id.unwrap_or(template.use_plate_id),
        proteins: overlay.proteins.unwrap_or(template.proteins),
        substrates: overlay.substrates.unwrap_or(template.substrates),
        solvent: overlay.solvent.unwrap_or(template.solvent),
        solvent_concentration: overlay
            .solvent_concentration
            .unwrap_or(template.solvent_concentration),
        buffer: overlay.buffer.unwrap_or(template.buffer),
        researcher: overlay.researcher.unwrap_or(template.researcher),
        date: overlay.date.unwrap_or(template.date),
        reference_names: overlay.reference_names.unwrap_or(template.reference_names),
        rate_window: overlay.rate_window.unwrap_or(template.rate_window),
    }
}
