//! Mission Plan Loading
//!
//! Parses the `key: value` plan file that configures a full operation:
//! which mission files to fly, where home is, and the RC-trigger and
//! airdrop parameters.

use crate::error::{Error, Result};
use crate::geo::Coordinate;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const DEFAULT_AIRDROP_SERVO: u8 = 9;
const DEFAULT_SERVO_OPEN_PWM: u16 = 1900;
const DEFAULT_SERVO_CLOSE_PWM: u16 = 1100;
const DEFAULT_NUM_IMAGES: u32 = 20;
const DEFAULT_IMAGE_DIR: &str = "./detect_images";
const DEFAULT_MAX_DETECT_ATTEMPTS: u32 = 1;

/// Parsed mission-plan configuration.
#[derive(Debug, Clone)]
pub struct MissionPlan {
    /// Mission file flown on launch.
    pub takeoff: PathBuf,
    /// Mission file flown to land.
    pub land: PathBuf,
    /// Geofence mission file, uploaded during preflight.
    pub geofence: PathBuf,
    /// Detection sweep mission file.
    pub detect: PathBuf,
    /// Airdrop mission template; the synthesizer rewrites its target item.
    pub airdrop: PathBuf,
    pub home: Coordinate,
    /// Sequence number the aircraft must reach before imaging starts.
    pub detect_index: u16,
    /// Sequence number of the release waypoint in the airdrop template.
    pub airdrop_index: u16,
    pub trigger_channel: u8,
    pub trigger_value: u16,
    /// Seconds to wait for the RC takeoff trigger.
    pub trigger_wait_time: u64,
    pub airdrop_altitude: f32,
    pub detection_entry: Coordinate,
    pub detection_exit: Coordinate,
    /// Width of the detection corridor in meters.
    pub detection_width: f64,

    pub airdrop_servo: u8,
    pub servo_open_pwm: u16,
    pub servo_close_pwm: u16,
    pub num_images: u32,
    pub image_dir: PathBuf,
    pub max_detect_attempts: u32,
    /// Fire the release servo from the controller after the drop waypoint,
    /// instead of relying on the DO_SET_SERVO item inside the mission.
    pub manual_release: bool,
    /// Pre-briefed target coordinates, when the plan carries them.
    pub targets: Vec<Coordinate>,
}

impl MissionPlan {
    /// Load and parse a plan file. Blank lines and `#` comments are
    /// ignored; every other line must be `key: value`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|_| Error::FileNotFound(path.to_path_buf()))?;
        if raw.trim().is_empty() {
            return Err(Error::FileEmpty(path.to_path_buf()));
        }

        let mut map = HashMap::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| Error::MalformedValue(line.to_string()))?;
            map.insert(key.trim().to_string(), value.trim().to_string());
        }

        Ok(Self {
            takeoff: PathBuf::from(required(&map, "takeoff")?),
            land: PathBuf::from(required(&map, "land")?),
            geofence: PathBuf::from(required(&map, "geofence")?),
            detect: PathBuf::from(required(&map, "detect")?),
            airdrop: PathBuf::from(required(&map, "airdrop")?),
            home: parse_coordinate(required(&map, "home")?, "home")?,
            detect_index: parse_value(&map, "detect_index")?,
            airdrop_index: parse_value(&map, "airdrop_index")?,
            trigger_channel: parse_value(&map, "trigger_channel")?,
            trigger_value: parse_value(&map, "trigger_value")?,
            trigger_wait_time: parse_value(&map, "trigger_wait_time")?,
            airdrop_altitude: parse_value(&map, "airdrop_altitude")?,
            detection_entry: parse_coordinate(
                required(&map, "detection_entry")?,
                "detection_entry",
            )?,
            detection_exit: parse_coordinate(
                required(&map, "detection_exit")?,
                "detection_exit",
            )?,
            detection_width: parse_value(&map, "detection_width")?,
            airdrop_servo: parse_optional(&map, "airdrop_servo", DEFAULT_AIRDROP_SERVO)?,
            servo_open_pwm: parse_optional(&map, "servo_open_pwm", DEFAULT_SERVO_OPEN_PWM)?,
            servo_close_pwm: parse_optional(&map, "servo_close_pwm", DEFAULT_SERVO_CLOSE_PWM)?,
            num_images: parse_optional(&map, "num_images", DEFAULT_NUM_IMAGES)?,
            image_dir: map
                .get("image_dir")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGE_DIR)),
            max_detect_attempts: parse_optional(
                &map,
                "max_detect_attempts",
                DEFAULT_MAX_DETECT_ATTEMPTS,
            )?,
            manual_release: parse_optional(&map, "manual_release", false)?,
            targets: parse_targets(&map)?,
        })
    }
}

fn required<'a>(map: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    map.get(key)
        .map(String::as_str)
        .ok_or_else(|| Error::MissingKey(key.to_string()))
}

fn parse_value<T: FromStr>(map: &HashMap<String, String>, key: &str) -> Result<T> {
    required(map, key)?
        .parse()
        .map_err(|_| Error::MalformedValue(key.to_string()))
}

fn parse_optional<T: FromStr>(
    map: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T> {
    match map.get(key) {
        Some(value) => value
            .parse()
            .map_err(|_| Error::MalformedValue(key.to_string())),
        None => Ok(default),
    }
}

/// Parse `lat,lon,alt` into a coordinate.
fn parse_coordinate(value: &str, key: &str) -> Result<Coordinate> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(Error::MalformedValue(key.to_string()));
    }
    let lat: f64 = parts[0]
        .parse()
        .map_err(|_| Error::MalformedValue(key.to_string()))?;
    let lon: f64 = parts[1]
        .parse()
        .map_err(|_| Error::MalformedValue(key.to_string()))?;
    let alt: f32 = parts[2]
        .parse()
        .map_err(|_| Error::MalformedValue(key.to_string()))?;
    Coordinate::new(lat, lon, alt).map_err(|_| Error::MalformedValue(key.to_string()))
}

/// Optional `targets` key: semicolon-separated `lat,lon,alt` triples.
fn parse_targets(map: &HashMap<String, String>) -> Result<Vec<Coordinate>> {
    match map.get("targets") {
        Some(value) if !value.trim().is_empty() => value
            .split(';')
            .map(|triple| parse_coordinate(triple.trim(), "targets"))
            .collect(),
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn plan_text() -> &'static str {
        "takeoff: missions/takeoff.txt\n\
         land: missions/land.txt\n\
         geofence: missions/fence.txt\n\
         detect: missions/detect.txt\n\
         airdrop: missions/airdrop.txt\n\
         home: 38.3152762, -76.5490833, 0\n\
         detect_index: 5\n\
         airdrop_index: 8\n\
         trigger_channel: 7\n\
         trigger_value: 1900\n\
         trigger_wait_time: 60\n\
         airdrop_altitude: 45\n\
         \n\
         # detection corridor\n\
         detection_entry: 38.3150, -76.5500, 45\n\
         detection_exit: 38.3160, -76.5480, 45\n\
         detection_width: 60\n"
    }

    fn write_plan(name: &str, text: &str) -> PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
        path
    }

    #[test]
    fn parses_a_complete_plan() {
        let path = write_plan("skycourier_plan_ok.txt", plan_text());
        let plan = MissionPlan::load(&path).unwrap();
        assert_eq!(plan.detect_index, 5);
        assert_eq!(plan.trigger_channel, 7);
        assert!((plan.home.lat() - 38.3152762).abs() < 1e-9);
        assert_eq!(plan.airdrop_servo, DEFAULT_AIRDROP_SERVO);
        assert_eq!(plan.max_detect_attempts, 1);
        assert!(plan.targets.is_empty());
    }

    #[test]
    fn missing_key_is_reported_by_name() {
        let text = plan_text().replace("airdrop_index: 8\n", "");
        let path = write_plan("skycourier_plan_missing.txt", &text);
        match MissionPlan::load(&path) {
            Err(Error::MissingKey(key)) => assert_eq!(key, "airdrop_index"),
            other => panic!("expected MissingKey, got {other:?}"),
        }
    }

    #[test]
    fn malformed_value_is_reported_by_key() {
        let text = plan_text().replace("detect_index: 5", "detect_index: five");
        let path = write_plan("skycourier_plan_malformed.txt", &text);
        match MissionPlan::load(&path) {
            Err(Error::MalformedValue(key)) => assert_eq!(key, "detect_index"),
            other => panic!("expected MalformedValue, got {other:?}"),
        }
    }

    #[test]
    fn briefed_targets_parse() {
        let text = format!(
            "{}targets: 38.3155,-76.5492,45; 38.3157, -76.5488, 45\n",
            plan_text()
        );
        let path = write_plan("skycourier_plan_targets.txt", &text);
        let plan = MissionPlan::load(&path).unwrap();
        assert_eq!(plan.targets.len(), 2);
        assert!((plan.targets[1].lon() - -76.5488).abs() < 1e-9);
    }

    #[test]
    fn missing_file_and_empty_file() {
        assert!(matches!(
            MissionPlan::load(Path::new("/nonexistent/plan.txt")),
            Err(Error::FileNotFound(_))
        ));
        let path = write_plan("skycourier_plan_empty.txt", "\n  \n");
        assert!(matches!(
            MissionPlan::load(&path),
            Err(Error::FileEmpty(_))
        ));
    }
}
