// scanline_sim/src/simulation/core/transforms.rs

//! Conversions between the ENU world frame used by `scanline_core` and Bevy's
//! Y-up, right-handed frame.
//!
//! ENU X (East) is Bevy X, ENU Y (North) is Bevy -Z, ENU Z (Up) is Bevy Y.

use bevy::prelude::{GlobalTransform, Quat as BevyQuat, Transform as BevyTransform, Vec3 as BevyVec3};
use nalgebra::{Isometry3, Point3, Quaternion, Translation3, UnitQuaternion, Vector3};
use std::f64::consts::FRAC_PI_2;

/// Rotation taking ENU basis vectors to their Bevy coordinates: -90 degrees about X.
pub fn enu_frame_to_bevy_frame() -> UnitQuaternion<f64> {
    UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -FRAC_PI_2)
}

// --- Vectors and points ---

pub fn enu_vector_to_bevy_vector(enu_vec: &Vector3<f64>) -> BevyVec3 {
    BevyVec3::new(
        enu_vec.x as f32,  // East -> Bevy X
        enu_vec.z as f32,  // Up -> Bevy Y
        -enu_vec.y as f32, // North -> Bevy -Z
    )
}

pub fn bevy_vector_to_enu_vector(bevy_vec: &BevyVec3) -> Vector3<f64> {
    Vector3::new(
        f64::from(bevy_vec.x),
        -f64::from(bevy_vec.z),
        f64::from(bevy_vec.y),
    )
}

pub fn enu_point_to_bevy_point(enu_point: &Point3<f64>) -> BevyVec3 {
    enu_vector_to_bevy_vector(&enu_point.coords)
}

pub fn bevy_point_to_enu_point(bevy_point: &BevyVec3) -> Point3<f64> {
    Point3::from(bevy_vector_to_enu_vector(bevy_point))
}

/// Same as [`enu_point_to_bevy_point`] for single-precision cloud points.
pub fn enu_point_f32_to_bevy_point(enu_point: &Point3<f32>) -> BevyVec3 {
    BevyVec3::new(enu_point.x, enu_point.z, -enu_point.y)
}

// --- Orientations ---

/// Converts an object's orientation from the ENU frame to the Bevy frame.
pub fn enu_quat_to_bevy_quat(enu_obj_quat: &UnitQuaternion<f64>) -> BevyQuat {
    // q_bevy = F * q_enu * F^-1
    let frame = enu_frame_to_bevy_frame();
    let q = frame * enu_obj_quat * frame.inverse();
    BevyQuat::from_xyzw(
        q.coords.x as f32,
        q.coords.y as f32,
        q.coords.z as f32,
        q.coords.w as f32,
    )
}

/// Converts an object's orientation from the Bevy frame to the ENU frame.
pub fn bevy_quat_to_enu_quat(bevy_obj_quat: &BevyQuat) -> UnitQuaternion<f64> {
    // nalgebra's Quaternion::new is (w, x, y, z).
    let q_bevy = UnitQuaternion::from_quaternion(Quaternion::new(
        f64::from(bevy_obj_quat.w),
        f64::from(bevy_obj_quat.x),
        f64::from(bevy_obj_quat.y),
        f64::from(bevy_obj_quat.z),
    ));
    // q_enu = F^-1 * q_bevy * F
    let frame = enu_frame_to_bevy_frame();
    frame.inverse() * q_bevy * frame
}

// --- Full poses ---

pub fn enu_iso_to_bevy_transform(enu_pose: &Isometry3<f64>) -> BevyTransform {
    BevyTransform {
        translation: enu_vector_to_bevy_vector(&enu_pose.translation.vector),
        rotation: enu_quat_to_bevy_quat(&enu_pose.rotation),
        scale: BevyVec3::ONE,
    }
}

pub fn bevy_transform_to_enu_iso(bevy_transform: &BevyTransform) -> Isometry3<f64> {
    Isometry3::from_parts(
        Translation3::from(bevy_vector_to_enu_vector(&bevy_transform.translation)),
        bevy_quat_to_enu_quat(&bevy_transform.rotation),
    )
}

pub fn bevy_global_transform_to_enu_iso(bevy_global_transform: &GlobalTransform) -> Isometry3<f64> {
    bevy_transform_to_enu_iso(&bevy_global_transform.compute_transform())
}
