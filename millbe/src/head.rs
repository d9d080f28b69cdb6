//! Generates a [head](https://learn.microsoft.com/en-us/typography/opentype/spec/head) table.

use std::env;

use chrono::{DateTime, TimeZone, Utc};
use log::warn;
use millir::font::FontInfo;
use write_fonts::{
    tables::{
        glyf::Bbox,
        head::{Flags, Head, MacStyle},
        loca::LocaFormat,
    },
    types::{Fixed, LongDateTime},
};

use crate::font::info_bits;

// The TrueType epoch (1st January 1904) as a Unix timestamp.
// Equivalent to Utc.with_ymd_and_hms(1904, 1, 1, 0, 0, 0).unwrap().timestamp()
const MACINTOSH_EPOCH: i64 = -2082844800;

fn timestamp_since_mac_epoch(datetime: DateTime<Utc>) -> i64 {
    let mac_epoch = Utc.timestamp_opt(MACINTOSH_EPOCH, 0).single();
    match mac_epoch {
        Some(mac_epoch) => datetime.signed_duration_since(mac_epoch).num_seconds(),
        None => datetime.timestamp() - MACINTOSH_EPOCH,
    }
}

/// The number of seconds since 00:00 1904-01-01 (GMT/UTC).
///
/// If the [SOURCE_DATE_EPOCH](https://reproducible-builds.org/specs/source-date-epoch/)
/// environment variable is set, use that instead of the current time.
fn current_timestamp() -> i64 {
    let mut src_date = None;
    if let Ok(src_date_var) = env::var("SOURCE_DATE_EPOCH") {
        if let Ok(timestamp) = src_date_var.parse::<i64>() {
            src_date = Utc.timestamp_opt(timestamp, 0).single();
        };
        if src_date.is_none() {
            warn!(
                "Invalid SOURCE_DATE_EPOCH value: {:?}. Falling back to Utc::now().",
                src_date_var
            );
        }
    }
    timestamp_since_mac_epoch(src_date.unwrap_or_else(Utc::now))
}

/// openTypeHeadCreated is "YYYY/MM/DD HH:MM:SS"
fn created_timestamp(info: &FontInfo) -> Option<i64> {
    let created = info.get_str("openTypeHeadCreated")?;
    match chrono::NaiveDateTime::parse_from_str(created, "%Y/%m/%d %H:%M:%S") {
        Ok(created) => Some(timestamp_since_mac_epoch(created.and_utc())),
        Err(e) => {
            warn!("Ignoring openTypeHeadCreated {created:?}: {e}");
            None
        }
    }
}

/// versionMajor.versionMinor, minor read as thousandths the way fontmake does
pub(crate) fn font_revision(info: &FontInfo) -> f64 {
    let major = info.get_f64("versionMajor").unwrap_or(0.0);
    let minor = info.get_f64("versionMinor").unwrap_or(0.0);
    major + minor / 1000.0
}

/// Bold and italic as declared by the style map, `regular` if absent
pub(crate) fn mac_style(info: &FontInfo) -> MacStyle {
    let mut mac_style = MacStyle::empty();
    let style = info.get_str("styleMapStyleName").unwrap_or("regular");
    if style.contains("bold") {
        mac_style |= MacStyle::BOLD;
    }
    if style.contains("italic") {
        mac_style |= MacStyle::ITALIC;
    }
    mac_style
}

pub(crate) fn build_head(info: &FontInfo, bbox: Bbox, loca_format: LocaFormat) -> Head {
    let created = created_timestamp(info);
    let now = current_timestamp();
    // the SOURCE_DATE_EPOCH wins over the source's own date
    let created = if env::var("SOURCE_DATE_EPOCH").is_ok() {
        now
    } else {
        created.unwrap_or(now)
    };

    // baseline at y=0 and lsb at x=0 unless the source says otherwise
    let flags = info_bits(info, "openTypeHeadFlags").unwrap_or(0b11);

    Head {
        font_revision: Fixed::from_f64(font_revision(info)),
        checksum_adjustment: 0,
        magic_number: 0x5F0F3CF5,
        flags: Flags::from_bits_truncate(flags as u16),
        units_per_em: info.units_per_em() as u16,
        created: LongDateTime::new(created),
        modified: LongDateTime::new(now),
        x_min: bbox.x_min,
        y_min: bbox.y_min,
        x_max: bbox.x_max,
        y_max: bbox.y_max,
        mac_style: mac_style(info),
        lowest_rec_ppem: info
            .get_f64("openTypeHeadLowestRecPPEM")
            .map(|v| v as u16)
            .unwrap_or(6),
        font_direction_hint: 2,
        index_to_loc_format: match loca_format {
            LocaFormat::Short => 0,
            LocaFormat::Long => 1,
        },
    }
}
