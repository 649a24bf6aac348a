use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::TimestampError;

/// Where a photo's capture time came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampSource {
    Exif,
    FileModified,
}

/// Camera position in decimal degrees; south and west are negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpsPosition {
    pub latitude: f64,
    pub longitude: f64,
}

/// Resolve when a photo was taken: EXIF `DateTimeOriginal`, then EXIF
/// `DateTime`, then the file's modification time in local time.
pub fn resolve_capture_time(path: &Path) -> Result<(NaiveDateTime, TimestampSource), TimestampError> {
    if let Some(taken_at) = read_exif_timestamp(path) {
        return Ok((taken_at, TimestampSource::Exif));
    }

    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|source| TimestampError {
            path: path.to_path_buf(),
            source,
        })?;

    tracing::debug!("No EXIF capture time for {:?}, using file mtime", path);
    Ok((
        DateTime::<Local>::from(modified).naive_local(),
        TimestampSource::FileModified,
    ))
}

/// Position from the EXIF GPS tags, when the camera wrote all four of them.
pub fn read_gps_position(path: &Path) -> Option<GpsPosition> {
    let exif = read_exif(path)?;
    let field = |tag: exif::Tag| exif.get_field(tag, exif::In::PRIMARY);

    let (lat, lat_ref, lon, lon_ref) = (
        field(exif::Tag::GPSLatitude)?,
        field(exif::Tag::GPSLatitudeRef)?,
        field(exif::Tag::GPSLongitude)?,
        field(exif::Tag::GPSLongitudeRef)?,
    );
    match (&lat.value, &lon.value) {
        (exif::Value::Rational(lat_dms), exif::Value::Rational(lon_dms)) => Some(GpsPosition {
            latitude: signed_degrees(lat_dms, &lat_ref.display_value().to_string(), 'S')?,
            longitude: signed_degrees(lon_dms, &lon_ref.display_value().to_string(), 'W')?,
        }),
        _ => None,
    }
}

/// Degrees, minutes and seconds to decimal degrees, negated when the
/// reference names the `negative` hemisphere.
fn signed_degrees(dms: &[exif::Rational], reference: &str, negative: char) -> Option<f64> {
    if dms.len() < 3 || dms[..3].iter().any(|r| r.denom == 0) {
        return None;
    }
    let part = |r: &exif::Rational| r.num as f64 / r.denom as f64;
    let degrees = part(&dms[0]) + part(&dms[1]) / 60.0 + part(&dms[2]) / 3600.0;
    Some(if reference.contains(negative) { -degrees } else { degrees })
}

fn read_exif(path: &Path) -> Option<exif::Exif> {
    let file = File::open(path).ok()?;
    let mut bufreader = BufReader::new(file);
    exif::Reader::new().read_from_container(&mut bufreader).ok()
}

fn read_exif_timestamp(path: &Path) -> Option<NaiveDateTime> {
    let exif = read_exif(path)?;

    [exif::Tag::DateTimeOriginal, exif::Tag::DateTime]
        .into_iter()
        .filter_map(|tag| exif.get_field(tag, exif::In::PRIMARY))
        .find_map(|field| match field.value {
            exif::Value::Ascii(ref v) => v.first().and_then(|raw| parse_exif_datetime(raw)),
            _ => None,
        })
}

/// Parse the `YYYY:MM:DD HH:MM:SS` form cameras write.
fn parse_exif_datetime(raw: &[u8]) -> Option<NaiveDateTime> {
    let dt = exif::DateTime::from_ascii(raw).ok()?;
    NaiveDate::from_ymd_opt(dt.year as i32, dt.month as u32, dt.day as u32)?.and_hms_opt(
        dt.hour as u32,
        dt.minute as u32,
        dt.second as u32,
    )
}
