//! Match a small synthetic census network and a counter dataset onto a basemap.
//!
//! Run with: cargo run --example network_matching

use street_matcher::{
    evaluate_matches, generate_segments, Annotation, BoundingBox, Geometry, NetworkMatchOptions,
    Record, Result, StreetModel,
};

/// A lattice of streets: horizontal and vertical lines every 0.002°.
fn basemap(origin: (f64, f64), blocks: usize) -> Vec<Record> {
    let step = 0.002;
    let mut records = Vec::new();
    for i in 0..blocks {
        for j in 0..blocks {
            let (x, y) = (origin.0 + i as f64 * step, origin.1 + j as f64 * step);
            records.push(Record::new(
                format!("osm-h-{i}-{j}"),
                Geometry::line(&[(x + 0.0001, y + 0.0001), (x + step, y + 0.0003)]),
            ));
            records.push(Record::new(
                format!("osm-v-{i}-{j}"),
                Geometry::line(&[(x + 0.0002, y + 0.0002), (x + 0.0004, y + step)]),
            ));
        }
    }
    records
}

/// The same lattice re-surveyed with a small offset and different ids.
fn census(basemap: &[Record]) -> Vec<Record> {
    basemap
        .iter()
        .filter_map(|r| {
            let lines = r.geometry.as_lines()?;
            let coords: Vec<(f64, f64)> = lines.0[0]
                .coords()
                .map(|c| (c.x + 0.00001, c.y - 0.00001))
                .collect();
            Some(Record::new(r.id.replace("osm", "census"), Geometry::line(&coords)))
        })
        .collect()
}

fn main() -> Result<()> {
    env_logger::init();

    let bbox = BoundingBox::new(16.59, 49.18, 16.63, 49.22);
    let grid = generate_segments(bbox, 4)?;

    let basemap = basemap((16.595, 49.185), 10);
    let census = census(&basemap);
    let counters = vec![
        Record::new("counter-1", Geometry::point(16.5962, 49.1852)),
        Record::new("counter-2", Geometry::point(16.6003, 49.1901)),
    ];

    let mut model = StreetModel::new(basemap, grid);
    let table = model.match_street_network("census_id", &census, &NetworkMatchOptions::default());
    println!(
        "Census: {} of {} examined lines matched",
        table.matched_count(),
        table.len()
    );

    let annotations: Vec<Annotation> = table
        .iter()
        .map(|(osm, _)| Annotation::new(osm, [osm.replace("osm", "census")]))
        .collect();
    println!("Census accuracy: {}", evaluate_matches(table, &annotations));

    let counters_table = model.match_points("counter_id", &counters);
    for (osm, counter) in counters_table.iter().filter(|(_, c)| c.is_some()) {
        println!("{} -> {}", osm, counter.unwrap_or_default());
    }

    println!("Columns: {:?}", model.column_names().collect::<Vec<_>>());
    Ok(())
}
