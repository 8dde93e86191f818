mod common;

use std::path::Path;
use std::sync::Arc;

use common::{config, grid_frame, offset_frame, EXPECTED, P1};
use taggrid::core::TileSize;
use taggrid::tags::{TagPattern, TagSource};
use taggrid::{NotificationTemplate, Roi, ScanStage, TagCatalog};

fn stage() -> ScanStage {
    ScanStage::from_config(&config(Path::new("unused.png"))).expect("stage")
}

#[test]
fn full_frame_roi_decodes_the_grid() {
    let stage = stage();
    assert_eq!(stage.rect_size(), (68, 68));

    let (rectified, scan) = stage
        .run(&grid_frame(), &Roi::full_frame())
        .expect("rectifiable");
    assert_eq!((rectified.width, rectified.height), (68, 68));
    assert_eq!(scan.grid.to_wire(), EXPECTED.map(Vec::from).to_vec());
    assert_eq!(scan.grid.matched_count(), 3);
    assert_eq!(scan.degenerate_cells().count(), 0);
}

#[test]
fn roi_selects_the_grid_inside_a_larger_frame() {
    let stage = stage();
    let frame = offset_frame();
    let roi = Roi::from_abs(
        [[50.0, 50.0], [250.0, 50.0], [250.0, 250.0], [50.0, 250.0]],
        frame.width,
        frame.height,
    );

    let (_, scan) = stage.run(&frame, &roi).expect("rectifiable");
    assert_eq!(scan.grid.to_wire(), EXPECTED.map(Vec::from).to_vec());

    let (_, whole) = stage.run(&frame, &Roi::full_frame()).expect("rectifiable");
    assert_ne!(whole.grid, scan.grid);
}

#[test]
fn collapsed_roi_is_not_rectified() {
    let stage = stage();
    let point = Roi::new([[0.5, 0.5]; 4]);
    assert!(stage.run(&grid_frame(), &point).is_none());
    assert_eq!(
        stage.unmatched().to_wire(),
        vec![vec![-1, -1], vec![-1, -1]]
    );
}

#[test]
fn replacing_the_catalog_renumbers_tags() {
    let mut stage = stage();
    let size = TileSize {
        width: 4,
        height: 4,
    };
    let patterns = TagPattern::from_sources(&[TagSource::Bits(P1.into())], size).expect("pattern");
    stage.set_catalog(Arc::new(TagCatalog::build(&patterns, size).expect("catalog")));

    let (_, scan) = stage
        .run(&grid_frame(), &Roi::full_frame())
        .expect("rectifiable");
    assert_eq!(scan.grid.to_wire(), vec![vec![-1, 0], vec![0, -1]]);
}

#[test]
fn notification_payload_embeds_the_grid() {
    let mut cfg = config(Path::new("unused.png"));
    cfg.notify.template = serde_json::json!({ "site": "lab", "scan": { "grid": null } });
    cfg.notify.assign_to = "/scan/grid".into();

    let (_, scan) = stage()
        .run(&grid_frame(), &Roi::full_frame())
        .expect("rectifiable");
    let payload = NotificationTemplate::from_config(&cfg.notify)
        .render(&scan.grid)
        .expect("payload");
    let doc: serde_json::Value = serde_json::from_str(&payload).expect("json");
    assert_eq!(doc["site"], "lab");
    assert_eq!(doc["scan"]["grid"], serde_json::json!([[0, 1], [1, -1]]));
}
