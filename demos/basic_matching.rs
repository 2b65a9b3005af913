//! Basic example of matching one street against a few candidates.
//!
//! Run with: cargo run --example basic_matching

use street_matcher::{
    angle_between, ellipse_iou, match_lines_by_bbox_overlap, tolerance_schedule, Geometry,
    MatchConfig,
};

fn main() {
    // OSM street in Brno, ~150m long
    let osm = Geometry::line(&[(16.6000, 49.1900), (16.6020, 49.1920)]);

    // Candidates from a census dataset
    let nearly_same = Geometry::line(&[(16.60002, 49.19001), (16.60199, 49.19202)]);
    let reversed = Geometry::line(&[(16.6020, 49.1920), (16.6000, 49.1900)]);
    let crossing = Geometry::line(&[(16.6000, 49.1920), (16.6020, 49.1900)]);
    let parallel_far = Geometry::line(&[(16.6030, 49.1900), (16.6050, 49.1920)]);

    let candidates = [
        ("nearly the same", &nearly_same),
        ("reversed", &reversed),
        ("crossing", &crossing),
        ("parallel, offset 0.003° east", &parallel_far),
    ];

    let Some(target) = osm.as_lines() else { return };
    let config = MatchConfig::default();

    println!("Street Matching Examples\n");
    println!("Tolerance schedule:");
    for (i, round) in tolerance_schedule(&config).iter().enumerate() {
        println!("   round {}: angle < {}°, {} digits", i, round.max_angle, round.round_digits);
    }
    println!();

    for (name, candidate) in &candidates {
        let Some(lines) = candidate.as_lines() else { continue };
        let angle = angle_between(target, lines).unwrap_or(f64::NAN);
        let iou = ellipse_iou(target, lines, config.round_digits);
        println!("{name}:");
        println!("   Angle: {angle:.1}°");
        println!("   Ellipse IoU: {iou:.3}");
        match match_lines_by_bbox_overlap(target, &[lines]) {
            Some(found) => println!(
                "   Match in round {} (score {:.3})\n",
                found.round_index, found.score
            ),
            None => println!("   No match\n"),
        }
    }

    // Pick the best among all of them at once
    let all: Vec<_> = candidates.iter().filter_map(|(_, c)| c.as_lines()).collect();
    if let Some(best) = match_lines_by_bbox_overlap(target, &all) {
        println!("Best candidate: {}", candidates[best.index].0);
    }
}
