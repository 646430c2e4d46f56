// scanline_sim/src/simulation/utils/serde_helpers.rs

//! `#[serde(with = ...)]` adapters for the compact array forms used in scenario files.

/// `[x, y, z]` <-> `Vector3<f64>`.
pub mod vec3_from_array {
    use nalgebra::Vector3;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(vec: &Vector3<f64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq([vec.x, vec.y, vec.z].iter())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vector3<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let arr: [f64; 3] = Deserialize::deserialize(deserializer)?;
        Ok(Vector3::from(arr))
    }
}

/// `[roll, pitch, yaw]` in degrees <-> `UnitQuaternion<f64>`.
pub mod quat_from_euler_deg {
    use nalgebra::UnitQuaternion;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(quat: &UnitQuaternion<f64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let (roll, pitch, yaw) = quat.euler_angles();
        serializer.collect_seq([roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees()].iter())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<UnitQuaternion<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let [roll, pitch, yaw]: [f64; 3] = Deserialize::deserialize(deserializer)?;
        Ok(UnitQuaternion::from_euler_angles(
            roll.to_radians(),
            pitch.to_radians(),
            yaw.to_radians(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Holder {
        #[serde(with = "vec3_from_array")]
        offset: Vector3<f64>,
        #[serde(with = "quat_from_euler_deg")]
        attitude: UnitQuaternion<f64>,
    }

    #[test]
    fn yaw_in_degrees_becomes_rotation_about_up() {
        let holder: Holder = toml::from_str("offset = [1.0, -2.0, 0.5]\nattitude = [0.0, 0.0, 90.0]")
            .expect("valid document");

        assert_relative_eq!(holder.offset, Vector3::new(1.0, -2.0, 0.5));
        let rotated = holder.attitude * Vector3::x();
        assert_relative_eq!(rotated, Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let result: Result<Holder, _> = toml::from_str("offset = [1.0, 2.0]\nattitude = [0.0, 0.0, 0.0]");
        assert!(result.is_err());
    }
}
