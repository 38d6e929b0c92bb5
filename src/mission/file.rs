//! Mission Text Format
//!
//! The line-oriented `QGC WPL 110` format: one item per line, twelve
//! tab-separated fields `seq current frame command p1 p2 p3 p4 lat lon alt
//! autocontinue`. Blank lines are skipped; anything else malformed fails
//! with the offending line number.

use crate::error::{Error, Result};
use crate::mission::item::{Frame, MissionCommand, MissionItem};

pub const WPL_HEADER: &str = "QGC WPL 110";

const FIELDS_PER_LINE: usize = 12;

/// Parse mission text into items. Line numbers in errors are 1-based and
/// include the header line.
pub fn parse(text: &str) -> Result<Vec<MissionItem>> {
    let mut lines = text.lines().enumerate();
    match lines.next() {
        Some((_, header)) if header.trim() == WPL_HEADER => {}
        _ => return Err(Error::MalformedItem { line: 1 }),
    }

    let mut items = Vec::new();
    for (index, line) in lines {
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }
        items.push(parse_line(line, line_no)?);
    }
    Ok(items)
}

fn parse_line(line: &str, line_no: usize) -> Result<MissionItem> {
    let malformed = || Error::MalformedItem { line: line_no };

    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
    if fields.len() != FIELDS_PER_LINE {
        return Err(malformed());
    }

    let seq: u16 = fields[0].parse().map_err(|_| malformed())?;
    let current: u8 = fields[1].parse().map_err(|_| malformed())?;
    let frame_raw: u8 = fields[2].parse().map_err(|_| malformed())?;
    let command_raw: u16 = fields[3].parse().map_err(|_| malformed())?;
    let frame = Frame::from_wpl(frame_raw).ok_or_else(malformed)?;
    let command = MissionCommand::from_wpl(command_raw).ok_or_else(malformed)?;

    let mut params = [0.0f32; 4];
    for (slot, field) in params.iter_mut().zip(&fields[4..8]) {
        *slot = field.parse().map_err(|_| malformed())?;
    }

    Ok(MissionItem {
        seq,
        current,
        frame,
        command,
        param1: params[0],
        param2: params[1],
        param3: params[2],
        param4: params[3],
        lat: fields[8].parse().map_err(|_| malformed())?,
        lon: fields[9].parse().map_err(|_| malformed())?,
        alt: fields[10].parse().map_err(|_| malformed())?,
        autocontinue: fields[11].parse().map_err(|_| malformed())?,
    })
}

/// Serialize items back to mission text. Field order is preserved verbatim;
/// numeric formatting uses the shortest round-trippable representation.
pub fn serialize(items: &[MissionItem]) -> String {
    let mut out = String::from(WPL_HEADER);
    out.push('\n');
    for item in items {
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
            item.seq,
            item.current,
            item.frame.to_wpl(),
            item.command.to_wpl(),
            item.param1,
            item.param2,
            item.param3,
            item.param4,
            item.lat,
            item.lon,
            item.alt,
            item.autocontinue,
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_text() -> String {
        let mut text = String::from("QGC WPL 110\n");
        text.push_str("0\t1\t3\t22\t15\t0\t0\t0\t38.3152762\t-76.5490833\t30\t1\n");
        text.push_str("\n");
        text.push_str("1\t0\t3\t16\t0\t5\t0\t0\t38.316\t-76.548\t45\t1\n");
        text.push_str("2\t0\t2\t183\t9\t1900\t0\t0\t0\t0\t0\t1\n");
        text.push_str("3\t0\t3\t20\t0\t0\t0\t0\t0\t0\t0\t1\n");
        text
    }

    #[test]
    fn parses_and_skips_blank_lines() {
        let items = parse(&sample_text()).unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].command, MissionCommand::Takeoff);
        assert_eq!(items[0].current, 1);
        assert_eq!(items[2].command, MissionCommand::DoSetServo);
        assert_eq!(items[2].param2, 1900.0);
    }

    #[test]
    fn missing_header_fails_on_line_one() {
        let text = sample_text().replacen("QGC WPL 110", "QGC WPL 100", 1);
        assert!(matches!(parse(&text), Err(Error::MalformedItem { line: 1 })));
    }

    #[test]
    fn wrong_field_count_reports_the_line() {
        let mut text = String::from("QGC WPL 110\n");
        text.push_str("0\t1\t3\t22\t15\t0\t0\t0\t38.3\t-76.5\t30\t1\n");
        text.push_str("1\t0\t3\t16\t0\t0\t0\t38.3\t-76.5\t45\t1\n"); // 11 fields
        match parse(&text) {
            Err(Error::MalformedItem { line }) => assert_eq!(line, 3),
            other => panic!("expected MalformedItem, got {other:?}"),
        }
    }

    #[test]
    fn unknown_command_is_malformed() {
        let mut text = String::from("QGC WPL 110\n");
        text.push_str("0\t1\t3\t999\t0\t0\t0\t0\t38.3\t-76.5\t30\t1\n");
        assert!(matches!(parse(&text), Err(Error::MalformedItem { line: 2 })));
    }

    #[test]
    fn round_trip_law() {
        let items = parse(&sample_text()).unwrap();
        let reparsed = parse(&serialize(&items)).unwrap();
        assert_eq!(items, reparsed);
    }
}
