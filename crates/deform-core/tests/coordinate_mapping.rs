use deform_core::{AxisOrder, Direction3, Geometry, Point3};
use proptest::prelude::*;

fn make_rotation(angle_x: f64, angle_y: f64, angle_z: f64) -> Direction3 {
    let (sx, cx) = angle_x.sin_cos();
    let (sy, cy) = angle_y.sin_cos();
    let (sz, cz) = angle_z.sin_cos();

    let rz = Direction3::new(
        cz, -sz, 0.0,
        sz, cz, 0.0,
        0.0, 0.0, 1.0,
    );
    let ry = Direction3::new(
        cy, 0.0, sy,
        0.0, 1.0, 0.0,
        -sy, 0.0, cy,
    );
    let rx = Direction3::new(
        1.0, 0.0, 0.0,
        0.0, cx, -sx,
        0.0, sx, cx,
    );
    rx * ry * rz
}

proptest! {
    #[test]
    fn test_coordinate_roundtrip(
        ox in -100.0f64..100.0, oy in -100.0f64..100.0, oz in -100.0f64..100.0,
        sx in 0.1f64..5.0, sy in -5.0f64..-0.1, sz in 0.1f64..5.0,
        ax in -3.14f64..3.14, ay in -3.14f64..3.14, az in -3.14f64..3.14,
        px in -50.0f64..50.0, py in -50.0f64..50.0, pz in -50.0f64..50.0
    ) {
        let geometry = Geometry::new(
            [2, 2, 2],
            Point3::new(ox, oy, oz),
            [sx, sy, sz],
            make_rotation(ax, ay, az) * AxisOrder::ZYX.direction(),
            AxisOrder::ZYX,
        ).unwrap();

        let point = Point3::new(px, py, pz);
        let index = geometry.world_to_index(&point);
        let recovered = geometry.index_to_world(index);

        prop_assert!((point.x - recovered.x).abs() < 1e-8, "X mismatch: {} vs {}", point.x, recovered.x);
        prop_assert!((point.y - recovered.y).abs() < 1e-8, "Y mismatch: {} vs {}", point.y, recovered.y);
        prop_assert!((point.z - recovered.z).abs() < 1e-8, "Z mismatch: {} vs {}", point.z, recovered.z);
    }

    #[test]
    fn test_axis_order_does_not_change_world_positions(
        i in 0usize..3, j in 0usize..4, k in 0usize..5,
        s in 0.5f64..3.0
    ) {
        let zyx = Geometry::axis_aligned([3, 4, 5], Point3::origin(), [s, s, s], AxisOrder::ZYX).unwrap();
        let xyz = Geometry::axis_aligned([5, 4, 3], Point3::origin(), [s, s, s], AxisOrder::XYZ).unwrap();

        let a = zyx.node_world([i, j, k]);
        let b = xyz.node_world([k, j, i]);
        prop_assert!((a - b).norm() < 1e-12);
    }
}
