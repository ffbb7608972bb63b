//! Joins transfers, a user layout and raw-signal validity into per-well
//! metadata.
//!
//! A user-authored layout wins on every well it assigns; inference from the
//! transfer only fills the wells it leaves unassigned.

use std::collections::BTreeMap;

use assay_core::plate::{well_to_index, PlateFormat};
use assay_core::AssayError;
use tracing::debug;

use crate::layout::{Entity, Layout, WellType};
use crate::transfer::{Transfer, TransferRules};

/// Resolved metadata of one well.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedWell {
    pub well_type: WellType,
    pub sample: Option<String>,
    /// Destination concentrations of the sample transfers, molar.
    pub concentrations: Vec<f64>,
    pub volumes: Vec<f64>,
    pub control: Option<String>,
    /// True when the user layout decided the type.
    pub from_user: bool,
}

/// All wells of one plate after resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPlate {
    pub plate_id: String,
    pub format: PlateFormat,
    pub wells: Vec<ResolvedWell>,
    /// The user layout completed with the inferred wells.
    pub layout: Layout,
    /// Sample ids in transfer order, user-only samples appended.
    pub sample_order: Vec<String>,
}

impl ResolvedPlate {
    /// Wells carrying `sample`, in index order.
    pub fn wells_of_sample(&self, sample: &str) -> Vec<usize> {
        self.wells
            .iter()
            .enumerate()
            .filter(|(_, well)| well.sample.as_deref() == Some(sample))
            .map(|(idx, _)| idx)
            .collect()
    }
}

fn classify(
    transfers: Option<&Vec<Transfer>>,
    raw_valid: bool,
    rules: &TransferRules,
) -> ResolvedWell {
    let Some(transfers) = transfers.filter(|t| !t.is_empty()) else {
        return ResolvedWell {
            well_type: if raw_valid { WellType::Buffer } else { WellType::Unassigned },
            ..ResolvedWell::default()
        };
    };
    if let Some(control) = transfers
        .iter()
        .filter_map(|t| t.sample.as_deref())
        .find(|sample| rules.is_control(sample))
    {
        return ResolvedWell {
            well_type: WellType::Control,
            control: Some(control.to_string()),
            ..ResolvedWell::default()
        };
    }
    // Solvent back-fills share the well with a sample transfer; the sample wins.
    let Some(sample) = transfers.iter().find_map(|t| t.sample.clone()) else {
        return ResolvedWell {
            well_type: WellType::Reference,
            ..ResolvedWell::default()
        };
    };
    let mine: Vec<&Transfer> = transfers
        .iter()
        .filter(|t| t.sample.as_deref() == Some(sample.as_str()))
        .collect();
    ResolvedWell {
        well_type: WellType::Sample,
        concentrations: mine.iter().map(|t| t.destination_concentration).collect(),
        volumes: mine.iter().map(|t| t.volume).collect(),
        sample: Some(sample),
        ..ResolvedWell::default()
    }
}

fn position_of(list: &mut Vec<String>, name: &str) -> usize {
    match list.iter().position(|known| known == name) {
        Some(pos) => pos,
        None => {
            list.push(name.to_string());
            list.len() - 1
        }
    }
}

/// Resolves one plate.
///
/// `transfers` is the plate's well map from the transfer parser (keyed by
/// sortable label), `user` the authored layout if any, and `raw_valid`
/// reports whether a well carries a usable reading.
pub fn resolve_plate(
    plate_id: &str,
    format: PlateFormat,
    transfers: Option<&BTreeMap<String, Vec<Transfer>>>,
    user: Option<&Layout>,
    raw_valid: impl Fn(usize) -> bool,
    rules: &TransferRules,
) -> Result<ResolvedPlate, AssayError> {
    let mut by_index: BTreeMap<usize, &Vec<Transfer>> = BTreeMap::new();
    if let Some(transfers) = transfers {
        for (label, entries) in transfers {
            by_index.insert(well_to_index(label, format)?, entries);
        }
    }

    let mut layout = match user {
        Some(user) => {
            let mut layout = user.clone();
            layout.plate_id = plate_id.to_string();
            layout
        }
        None => Layout::new(plate_id, format),
    };
    if layout.wells.len() != format.wells() {
        layout.wells.resize(format.wells(), Default::default());
    }

    let mut sample_order: Vec<String> = Vec::new();
    if let Some(transfers) = transfers {
        for entries in transfers.values() {
            for sample in entries.iter().filter_map(|t| t.sample.as_deref()) {
                if !rules.is_control(sample) {
                    position_of(&mut sample_order, sample);
                }
            }
        }
    }
    let mut controls: Vec<String> = rules.control_ids.clone();

    let mut wells = Vec::with_capacity(format.wells());
    for well in 0..format.wells() {
        let entry = &mut layout.wells[well];
        if entry.well_type != WellType::Unassigned {
            let mut resolved = classify(by_index.get(&well).copied(), raw_valid(well), rules);
            resolved.well_type = entry.well_type;
            resolved.from_user = true;
            match entry.well_type {
                WellType::Sample => {
                    if resolved.sample.is_none() && !entry.sample.name.is_empty() {
                        resolved.sample = Some(entry.sample.name.clone());
                        resolved.concentrations = vec![entry.sample.concentration];
                    }
                    if let Some(sample) = &resolved.sample {
                        position_of(&mut sample_order, sample);
                    }
                }
                WellType::Control => {
                    resolved.control = Some(entry.control.name.clone());
                    resolved.sample = None;
                }
                _ => resolved.sample = None,
            }
            wells.push(resolved);
            continue;
        }

        let resolved = classify(by_index.get(&well).copied(), raw_valid(well), rules);
        entry.well_type = resolved.well_type;
        match resolved.well_type {
            WellType::Sample => {
                if let Some(sample) = &resolved.sample {
                    entry.sample = Entity {
                        id: Some(position_of(&mut sample_order, sample)),
                        name: sample.clone(),
                        concentration: resolved.concentrations.first().copied().unwrap_or(f64::NAN),
                    };
                }
            }
            WellType::Control => {
                if let Some(control) = &resolved.control {
                    entry.control = Entity::named(position_of(&mut controls, control), control.clone());
                }
            }
            WellType::Reference => entry.reference = Entity::named(0, "solvent"),
            _ => {}
        }
        wells.push(resolved);
    }

    if layout.zprime_control().is_none() {
        if let Some(first) = layout
            .wells
            .iter()
            .filter(|e| e.well_type == WellType::Control)
            .filter_map(|e| e.control.id)
            .min()
        {
            debug!(plate_id, control = first, "flagging first control for Z′");
            layout.flag_zprime(first);
        }
    }
    layout.validate()?;

    Ok(ResolvedPlate {
        plate_id: plate_id.to_string(),
        format,
        wells,
        layout,
        sample_order,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(sample: Option<&str>, conc: f64) -> Transfer {
        Transfer {
            sample: sample.map(str::to_string),
            source_concentration: 10e-3,
            destination_concentration: conc,
            volume: 25.0,
        }
    }

    #[test]
    fn wells_are_classified_from_transfers() {
        let mut plate = BTreeMap::new();
        plate.insert("A01".to_string(), vec![transfer(Some("X1"), 1e-6)]);
        plate.insert("A02".to_string(), vec![transfer(None, f64::NAN)]);
        plate.insert("A03".to_string(), vec![transfer(Some("STAURO"), 1e-5)]);
        let rules = TransferRules {
            control_ids: vec!["STAURO".into()],
            ..TransferRules::default()
        };
        let resolved = resolve_plate(
            "P1",
            PlateFormat::Wells96,
            Some(&plate),
            None,
            |well| well < 5,
            &rules,
        )
        .unwrap();
        let types: Vec<WellType> = resolved.wells[..6].iter().map(|w| w.well_type).collect();
        assert_eq!(
            types,
            vec![
                WellType::Sample,
                WellType::Reference,
                WellType::Control,
                WellType::Buffer,
                WellType::Buffer,
                WellType::Unassigned
            ]
        );
        assert_eq!(resolved.layout.zprime_control(), Some(0));
        assert_eq!(resolved.sample_order, vec!["X1"]);
    }

    #[test]
    fn user_layout_overrides_inference() {
        let mut plate = BTreeMap::new();
        plate.insert("A01".to_string(), vec![transfer(None, f64::NAN)]);
        let mut user = Layout::new("P1", PlateFormat::Wells96);
        user.entry_mut(0).unwrap().well_type = WellType::Buffer;
        let resolved = resolve_plate(
            "P1",
            PlateFormat::Wells96,
            Some(&plate),
            Some(&user),
            |_| true,
            &TransferRules::default(),
        )
        .unwrap();
        assert_eq!(resolved.wells[0].well_type, WellType::Buffer);
        assert!(resolved.wells[0].from_user);
    }
}
