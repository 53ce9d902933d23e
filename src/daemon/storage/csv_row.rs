use crate::daemon::detection::record::NormalizedRecord;

pub const COLUMNS: [&str; 10] = [
    "timestamp",
    "process_name",
    "window_title",
    "process_id",
    "application_name",
    "application_path",
    "working_directory",
    "monitor_type",
    "is_new_document",
    "app_subtype",
];

pub fn header() -> String {
    COLUMNS.join(",")
}

const FULL_WIDTH_COMMA: &str = " ， ";

fn is_bidi_control(c: char) -> bool {
    matches!(
        c,
        '\u{200E}' | '\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2066}'..='\u{2069}' | '\u{FEFF}'
    )
}

/// Makes a free text value safe for a single CSV cell.
pub fn sanitize(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ',' => result.push_str(FULL_WIDTH_COMMA),
            c if is_bidi_control(c) => {}
            c if c.is_control() => result.push(' '),
            c => result.push(c),
        }
    }
    result
}

/// One line of the activity log, without the line terminator.
pub fn encode(record: &NormalizedRecord) -> String {
    [
        record.formatted_timestamp(),
        sanitize(&record.process_name),
        sanitize(&record.window_title),
        record.process_id.to_string(),
        sanitize(&record.application_name),
        sanitize(&record.application_path),
        sanitize(&record.working_directory),
        record.monitor_type.to_string(),
        record.is_new_document.to_string(),
        record.app_subtype.as_deref().map(sanitize).unwrap_or_default(),
    ]
    .join(",")
}

/// Pairs the cells of a stored line with their column names.
pub fn split(line: &str) -> Vec<(&'static str, &str)> {
    COLUMNS.iter().copied().zip(line.split(',')).collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::{
        daemon::detection::record::{MonitorType, NormalizedRecord},
        process_api::ProcessSnapshot,
    };

    use super::{encode, header, sanitize, split};

    #[test]
    fn strips_separators_and_control_characters() {
        assert_eq!(sanitize("a,b"), "a ， b");
        assert_eq!(sanitize("line\r\nnext\tcell"), "line  next cell");
        assert_eq!(sanitize("\u{202E}evil\u{200F}.txt\u{FEFF}"), "evil.txt");
        assert_eq!(sanitize("報告書.docx"), "報告書.docx");
    }

    #[test]
    fn encodes_all_columns_in_order() {
        let process = ProcessSnapshot {
            pid: 42,
            name: "WINWORD.EXE".into(),
            exe: Some("C:\\Office\\WINWORD.EXE".into()),
            ..Default::default()
        };
        let record = NormalizedRecord::from_process(
            Utc.with_ymd_and_hms(2024, 5, 6, 9, 30, 0).unwrap(),
            &process,
            "Budget, final - Word",
            MonitorType::Document,
        )
        .with_working_directory("C:\\Docs\\Budget, final.docx")
        .with_subtype("Word");

        let line = encode(&record);
        assert_eq!(
            line,
            "2024-05-06 09:30:00,WINWORD.EXE,Budget ，  final - Word,42,WINWORD.EXE,\
             C:\\Office\\WINWORD.EXE,C:\\Docs\\Budget ，  final.docx,document,false,Word"
        );

        let cells = split(&line);
        assert_eq!(cells.len(), 10);
        assert_eq!(cells[6], ("working_directory", "C:\\Docs\\Budget ，  final.docx"));
        assert_eq!(cells[9], ("app_subtype", "Word"));
        assert_eq!(header().split(',').count(), 10);
    }

    #[test]
    fn missing_subtype_is_an_empty_cell() {
        let record = NormalizedRecord::from_process(
            Utc.with_ymd_and_hms(2024, 5, 6, 9, 30, 0).unwrap(),
            &ProcessSnapshot::default(),
            "",
            MonitorType::General,
        );
        assert!(encode(&record).ends_with(",general,false,"));
    }
}
