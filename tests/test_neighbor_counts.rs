use approx::assert_relative_eq;
use nalgebra::{Matrix3, Vector3};
use neighbormodels_rs::{
    Cell, ModelError, NeighborSource, Site, Structure, count_neighbors, enumerate_pairs,
    label_subspecies, with_default_subspecies,
};

fn cubic_cell(a: f64) -> Cell {
    Cell::new(Matrix3::identity() * a, Vector3::new(true, true, true)).unwrap()
}

fn cscl() -> Structure {
    let s = Structure::new(
        cubic_cell(1.0),
        vec![
            Site::new("Fe", [0.0, 0.0, 0.0]),
            Site::new("Co", [0.5, 0.5, 0.5]),
        ],
    );
    with_default_subspecies(&s)
}

#[test]
fn test_unlabeled_structure_is_rejected() {
    let s = Structure::new(cubic_cell(1.0), vec![Site::new("Fe", [0.0, 0.0, 0.0])]);
    let err = count_neighbors(&s, 1.5, true).unwrap_err();
    assert_eq!(err, ModelError::MissingSubspecies { site: 0 });
}

#[test]
fn test_nonpositive_cutoff_is_rejected() {
    let s = cscl();
    assert_eq!(
        count_neighbors(&s, 0.0, true).unwrap_err(),
        ModelError::InvalidCutoff(0.0)
    );
    assert!(count_neighbors(&s, f64::NAN, true).is_err());
}

#[test]
fn test_cscl_counts() {
    let data = count_neighbors(&cscl(), 1.1, true).unwrap();
    assert_eq!(data.num_sites, 2);
    assert_eq!(data.shells.len(), 2);
    assert_relative_eq!(data.shells.radii()[0], 0.75f64.sqrt(), epsilon = 1e-12);
    assert_relative_eq!(data.shells.radii()[1], 1.0, epsilon = 1e-12);

    let summary: Vec<(usize, usize, &str, &str, usize, usize)> = data
        .counts
        .iter()
        .map(|r| {
            (
                r.i,
                r.j,
                r.subspecies_i.as_str(),
                r.subspecies_j.as_str(),
                r.shell,
                r.n,
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            (0, 0, "Fe", "Fe", 1, 6),
            (0, 1, "Co", "Fe", 0, 16),
            (1, 1, "Co", "Co", 1, 6),
        ]
    );
}

#[test]
fn test_ordered_pairs_keep_center_first() {
    let data = count_neighbors(&cscl(), 1.1, false).unwrap();
    assert_eq!(data.pair_total(0, 1), 8);
    assert_eq!(data.pair_total(1, 0), 8);
    // Sub-species are sorted even when the sites are not.
    assert!(
        data.counts
            .iter()
            .all(|r| r.subspecies_i <= r.subspecies_j)
    );
}

#[test]
fn test_counts_sum_to_record_total() {
    let s = cscl();
    for unordered in [true, false] {
        let records = enumerate_pairs(&s, 1.8, unordered).unwrap();
        let data = count_neighbors(&s, 1.8, unordered).unwrap();
        let total: usize = data.counts.iter().map(|r| r.n).sum();
        assert_eq!(total, records.len());
    }
}

#[test]
fn test_every_distance_is_binned() {
    let s = cscl();
    let data = count_neighbors(&s, 2.3, true).unwrap();
    for rec in enumerate_pairs(&s, 2.3, true).unwrap() {
        let shell = data.shells.locate(rec.distance).unwrap();
        assert!(data.shells.get(shell).unwrap().contains(rec.distance));
    }
}

#[test]
fn test_split_subspecies() {
    let cell = Cell::new(
        Matrix3::from_diagonal(&Vector3::new(2.0, 1.0, 1.0)),
        Vector3::new(true, true, true),
    )
    .unwrap();
    let s = Structure::new(
        cell,
        vec![
            Site::new("Fe", [0.0, 0.0, 0.0]),
            Site::new("Fe", [0.5, 0.0, 0.0]),
        ],
    );
    let labeled = label_subspecies(&s, &[0, 1]).unwrap();
    assert_eq!(labeled.category_label(0), Some("Fe1"));
    assert_eq!(labeled.category_label(1), Some("Fe2"));

    let data = count_neighbors(&labeled, 1.5, true).unwrap();
    let pairs = data.sublattice_pairs();
    let names: Vec<(&str, &str, usize)> = pairs
        .iter()
        .map(|p| (p.subspecies_i.as_str(), p.subspecies_j.as_str(), p.rank))
        .collect();
    assert_eq!(
        names,
        vec![
            ("Fe1", "Fe1", 1),
            ("Fe1", "Fe1", 2),
            ("Fe1", "Fe2", 1),
            ("Fe1", "Fe2", 2),
            ("Fe2", "Fe2", 1),
            ("Fe2", "Fe2", 2),
        ]
    );
}

#[test]
fn test_neighbor_data_serializes() {
    let data = count_neighbors(&cscl(), 1.1, true).unwrap();
    let json = serde_json::to_value(&data).unwrap();
    assert_eq!(json["num_sites"], 2);
    assert_eq!(json["counts"].as_array().unwrap().len(), 3);
    assert_eq!(json["counts"][1]["n"], 16);
}
