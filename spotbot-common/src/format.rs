///! Notification text for a spot
///!
///! Output uses Telegram's HTML parse mode (`<b>`, `<i>`, `<a href>`); every
///! provider-supplied value is escaped before it is placed in markup.

use crate::types::{SourceKind, Spot, SpotTime};

const QRZ_URL: &str = "https://www.qrz.com/db/";
const POTA_PARK_URL: &str = "https://pota.app/#/park/";

/// Escape markup characters and quotes for Telegram's HTML mode
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Render a kHz value without trailing zeros, e.g. `14074` or `7032.5`
pub fn format_frequency(frequency_khz: f64) -> String {
    if frequency_khz <= 0.0 {
        return "??".to_string();
    }
    let text = format!("{:.3}", frequency_khz);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{} kHz", text)
}

fn operator_link(spot: &Spot) -> String {
    let call = escape_html(&spot.operator_id);
    format!("<a href='{}{}'><b>[ {} ]</b></a>", QRZ_URL, call, call)
}

fn optional(value: &Option<String>) -> String {
    escape_html(value.as_deref().unwrap_or(""))
}

fn posted_at(spot: &Spot) -> String {
    let ts = spot.posted_at.clone().unwrap_or_else(SpotTime::unknown);
    format!("{} - {}", escape_html(&ts.date), escape_html(&ts.time))
}

/// Build the notification body for one spot
pub fn format_spot(spot: &Spot) -> String {
    let reference = escape_html(&spot.location_ref);
    let frequency = format_frequency(spot.frequency_khz);
    let mode = escape_html(&spot.mode);
    let comment = escape_html(&spot.comment);

    match spot.source {
        SourceKind::ParkActivation => format!(
            "{} is now activating park <a href='{}{}'><b>[ {} ]</b></a> - <i>{}</i>\n\n\
             Frequency: <b>{}</b>\n\
             Mode: <b>{}</b>\n\
             Region: <b>{}</b>\n\
             Info: <b>{}</b>",
            operator_link(spot),
            POTA_PARK_URL,
            reference,
            reference,
            optional(&spot.display.location_name),
            frequency,
            mode,
            optional(&spot.display.region),
            comment,
        ),
        SourceKind::SummitActivation => format!(
            "{} - <i>{}</i> is now activating summit <b>[ {} ]</b> - <i>{}</i>\n\n\
             Posted at: <b>{}</b>\n\
             Frequency: <b>{}</b>\n\
             Mode: <b>{}</b>\n\
             Activator's comment: <b>{}</b>",
            operator_link(spot),
            optional(&spot.display.operator_name),
            reference,
            optional(&spot.display.location_name),
            posted_at(spot),
            frequency,
            mode,
            comment,
        ),
        SourceKind::BunkerActivation => {
            let note = match spot.display.note.as_deref() {
                Some(note) if !note.trim().is_empty() => escape_html(note),
                _ => comment,
            };
            format!(
                "{} is now activating bunker <b>[ {} ]</b>\n\n\
                 Posted at: <b>{}</b>\n\
                 Frequency: <b>{}</b>\n\
                 Mode: <b>{}</b>\n\
                 Activator's comment: <b>{}</b>",
                operator_link(spot),
                reference,
                posted_at(spot),
                frequency,
                mode,
                note,
            )
        }
        SourceKind::LighthouseOrLightship => format!(
            "{} is now activating <b>[ {} ]</b> - <i>{}</i> ({})\n\n\
             Posted at: <b>{}</b>\n\
             Frequency: <b>{}</b>\n\
             Mode: <b>{}</b>\n\
             Info: <b>{}</b>",
            operator_link(spot),
            reference,
            optional(&spot.display.location_name),
            optional(&spot.display.region),
            posted_at(spot),
            frequency,
            mode,
            comment,
        ),
        SourceKind::BeachAnnouncement => {
            let when = match &spot.posted_at {
                Some(ts) if ts.time == "??" => escape_html(&ts.date),
                Some(ts) => format!("{} {}", escape_html(&ts.date), escape_html(&ts.time)),
                None => "??".to_string(),
            };
            format!(
                "{} will be activating beach <b>[ {} ]</b>\n\n\
                 Date and time: <b>{}</b>\n",
                operator_link(spot),
                reference,
                when,
            )
        }
    }
}
