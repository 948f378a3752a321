//! Property tests for the layout planner: any feasible plan keeps
//! elements disjoint and inside the boundary, and planning is a pure
//! function of its inputs.

use canvas_engine::{
    Constraint, ConstraintKind, ElementId, EngineConfig, LayoutEntry, LayoutPlanner, Region,
    SlotHint,
};
use proptest::prelude::*;

fn entries(n: usize) -> Vec<LayoutEntry> {
    (0..n)
        .map(|i| LayoutEntry {
            id: ElementId::new(),
            created_at: i as u64,
            slot: SlotHint::Auto,
        })
        .collect()
}

proptest! {
    #[test]
    fn plan_is_disjoint_and_in_bounds(
        width in 1100.0_f64..3000.0,
        height in 400.0_f64..2000.0,
        n in 1_usize..10,
    ) {
        let boundary = Region::rect(0.0, 0.0, width, height).expect("valid rect");
        let planner = LayoutPlanner::new(&EngineConfig::default());
        let plan = planner
            .plan(&boundary, &[], &entries(n))
            .expect("feasible on an open boundary");

        prop_assert_eq!(plan.placements.len(), n);
        for placement in &plan.placements {
            prop_assert!(boundary.contains_region(&placement.region).expect("same axes"));
            prop_assert!(!placement.overflows);
        }
        for (i, a) in plan.placements.iter().enumerate() {
            for b in &plan.placements[i + 1..] {
                prop_assert!(!a.region.intersects(&b.region).expect("same axes"));
            }
        }
    }

    #[test]
    fn plan_avoids_reserved_strip(
        strip in 20.0_f64..120.0,
        n in 1_usize..7,
    ) {
        let boundary = Region::rect(0.0, 0.0, 1280.0, 800.0).expect("valid rect");
        let reserved = Constraint::new(
            ConstraintKind::Reserved,
            Region::rect(0.0, 0.0, 1280.0, strip).expect("valid rect"),
        );
        let planner = LayoutPlanner::new(&EngineConfig::default());
        let plan = planner
            .plan(&boundary, &[reserved.clone()], &entries(n))
            .expect("feasible around a thin strip");

        for placement in &plan.placements {
            prop_assert!(!placement.region.intersects(&reserved.region).expect("same axes"));
        }
    }

    #[test]
    fn plan_is_deterministic(
        width in 1100.0_f64..3000.0,
        height in 400.0_f64..2000.0,
        n in 1_usize..10,
    ) {
        let boundary = Region::rect(0.0, 0.0, width, height).expect("valid rect");
        let planner = LayoutPlanner::new(&EngineConfig::default());
        let list = entries(n);
        let first = planner.plan(&boundary, &[], &list).expect("feasible");
        let second = planner.plan(&boundary, &[], &list).expect("feasible");
        prop_assert_eq!(first, second);
    }
}
