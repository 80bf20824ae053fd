use crate::models::DetectionRecord;

/// Sky position to use for a detection: the centroid refinement when the
/// feed provides one, otherwise the primary position. RA is normalized into
/// [0, 360); declination passes through unchanged.
pub fn resolve_coordinates(record: &DetectionRecord) -> (f64, f64) {
    let (mut ra, dec) = match &record.centroid {
        Some(centroid) => (centroid.ra_deg, centroid.dec_deg),
        None => (record.ra_deg, record.dec_deg),
    };
    if ra < 0.0 {
        ra += 360.0;
    }
    (ra, dec)
}

/// Right ascension in sexagesimal hours, e.g. "10h 24m 36.00s".
pub fn format_ra_hms(ra_deg: f64) -> String {
    let hours = ra_deg / 15.0;
    let h = hours as u32;
    let minutes = (hours - f64::from(h)) * 60.0;
    let m = minutes as u32;
    let s = (minutes - f64::from(m)) * 60.0;
    format!("{h:02}h {m:02}m {s:05.2}s")
}

/// Declination in sexagesimal degrees, e.g. "-05° 30' 00.00\"".
pub fn format_dec_dms(dec_deg: f64) -> String {
    let sign = if dec_deg >= 0.0 { '+' } else { '-' };
    let abs = dec_deg.abs();
    let d = abs as u32;
    let minutes = (abs - f64::from(d)) * 60.0;
    let m = minutes as u32;
    let s = (minutes - f64::from(m)) * 60.0;
    format!("{sign}{d:02}\u{00b0} {m:02}' {s:05.2}\"")
}
