use assay_core::plate::{index_to_well, sortable_well, well_to_index, PlateFormat};
use proptest::prelude::*;

fn formats() -> impl Strategy<Value = PlateFormat> {
    prop_oneof![
        Just(PlateFormat::Wells96),
        Just(PlateFormat::Wells384),
        Just(PlateFormat::Wells1536),
    ]
}

proptest! {
    #[test]
    fn label_index_roundtrip(fmt in formats(), raw in 0usize..1536) {
        let index = raw % fmt.wells();
        let label = index_to_well(index, fmt).unwrap();
        prop_assert_eq!(well_to_index(&label, fmt).unwrap(), index);
        prop_assert_eq!(index_to_well(well_to_index(&label, fmt).unwrap(), fmt).unwrap(), label);
    }

    #[test]
    fn sortable_labels_follow_index_order_within_a_row(fmt in formats(), row in 0usize..32) {
        let row = row % fmt.rows();
        let labels: Vec<String> = (0..fmt.cols())
            .map(|col| sortable_well(&index_to_well(row * fmt.cols() + col, fmt).unwrap(), fmt).unwrap())
            .collect();
        let mut sorted = labels.clone();
        sorted.sort();
        prop_assert_eq!(sorted, labels);
    }
}

#[test]
fn every_96_well_label_is_distinct() {
    let fmt = PlateFormat::Wells96;
    let mut labels: Vec<String> = (0..fmt.wells())
        .map(|i| index_to_well(i, fmt).unwrap())
        .collect();
    labels.sort();
    labels.dedup();
    assert_eq!(labels.len(), 96);
}
