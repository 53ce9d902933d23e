use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

use anyhow::Result;
use regex::Regex;
use tracing::{debug, instrument};

use crate::{process_api::ProcessSnapshot, window_api::WindowHandle};

use super::{
    paths::{has_extension, path_to_string, probe},
    record::{MonitorType, NormalizedRecord},
    DetectionContext, Detector, LastTitle,
};

/// Dedicated readers. Browsers showing a PDF are handled by the browser detector first.
const PDF_PROCESSES: &[&str] = &[
    "acrobat.exe",
    "acrord32.exe",
    "sumatrapdf.exe",
    "foxitpdfreader.exe",
    "pdfxedit.exe",
    "evince",
    "xpdf",
    "okular",
    "zathura",
];

const PDF_EXTENSION: &[&str] = &[".pdf"];

static TITLE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(.*\.pdf)\s*[-–—]",
        r"(?i)[-–—]\s*(.*\.pdf)",
        r"(?i)(.*\.pdf)",
    ]
    .into_iter()
    .filter_map(|v| Regex::new(v).ok())
    .collect()
});

fn is_pdf_process(process_name: &str) -> bool {
    PDF_PROCESSES
        .iter()
        .any(|v| v.eq_ignore_ascii_case(process_name))
}

pub fn is_pdf_title(title: &str) -> bool {
    has_extension(title.trim_end(), PDF_EXTENSION)
}

/// File names mentioned in the title, most specific pattern first.
pub fn names_from_title(title: &str) -> Vec<String> {
    let mut names: Vec<String> = vec![];
    for pattern in TITLE_PATTERNS.iter() {
        let Some(name) = pattern
            .captures(title)
            .and_then(|v| v.get(1))
            .map(|v| v.as_str().trim().to_string())
        else {
            continue;
        };
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

pub struct PdfDetector {
    context: DetectionContext,
    last_title: LastTitle,
}

impl PdfDetector {
    pub fn new(context: DetectionContext) -> Self {
        Self {
            context,
            last_title: LastTitle::default(),
        }
    }

    /// Tries the title, then the command line, then the open files.
    fn extract_path(&self, process: &ProcessSnapshot, title: &str) -> Option<String> {
        let mut dirs: Vec<PathBuf> = vec![];
        dirs.extend(process.meaningful_cwd().map(Path::to_path_buf));
        dirs.extend(std::env::current_dir().ok());
        dirs.extend(dirs::document_dir());
        dirs.extend(dirs::download_dir());

        for name in names_from_title(title) {
            let as_path = Path::new(&name);
            if as_path.is_absolute() && as_path.exists() {
                return Some(name);
            }
            if let Some(found) = probe(&dirs, [name.as_str()]) {
                return Some(path_to_string(&found));
            }
        }

        if let Some(arg) = process
            .cmdline
            .iter()
            .find(|arg| has_extension(arg, PDF_EXTENSION) && Path::new(arg).exists())
        {
            return Some(arg.clone());
        }

        match self.context.processes.open_files(process.pid) {
            Ok(files) => files
                .into_iter()
                .map(|v| path_to_string(&v))
                .find(|v| has_extension(v, PDF_EXTENSION)),
            Err(e) => {
                debug!("Failed to list open files of {}: {e:?}", process.pid);
                None
            }
        }
    }
}

impl Detector for PdfDetector {
    fn monitor_type(&self) -> MonitorType {
        MonitorType::Pdf
    }

    #[instrument(skip(self))]
    fn is_target(&self, window: WindowHandle) -> Result<bool> {
        let pid = self.context.windows.process_id(window)?;
        match self.context.processes.snapshot(pid) {
            Ok(process) if is_pdf_process(&process.name) => return Ok(true),
            Ok(_) => {}
            Err(e) => debug!("Process check failed for {pid}: {e:?}"),
        }
        Ok(is_pdf_title(&self.context.windows.title(window)?))
    }

    #[instrument(skip(self))]
    fn resolve(&self, window: WindowHandle) -> Result<Option<NormalizedRecord>> {
        let title = self.context.windows.title(window)?;
        if self.last_title.is_repeat(&title) {
            return Ok(None);
        }

        let pid = self.context.windows.process_id(window)?;
        let process = self.context.processes.snapshot(pid)?;
        let path = self.extract_path(&process, &title).unwrap_or_default();

        let record = NormalizedRecord::from_process(
            self.context.clock.time(),
            &process,
            title.as_str(),
            MonitorType::Pdf,
        )
        .with_working_directory(path);

        self.last_title.remember(&title);
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use crate::{
        daemon::detection::{
            record::MonitorType,
            test_support::{context, inspector, snapshot, title, window_system, WINDOW},
            Detector,
        },
        process_api::{MockProcessInspector, ProcessSnapshot},
    };

    use super::{is_pdf_title, names_from_title, PdfDetector};

    #[test]
    fn extracts_names_from_common_title_layouts() {
        assert_eq!(
            names_from_title("paper.pdf - Adobe Acrobat Reader"),
            vec!["paper.pdf"]
        );
        assert_eq!(names_from_title("SumatraPDF - book.PDF")[0], "book.PDF");
        assert!(names_from_title("Notes - Editor").is_empty());
        assert!(is_pdf_title("Report.PDF"));
        assert!(!is_pdf_title("Report.pdf - Reader"));
    }

    #[test]
    fn title_ending_in_pdf_is_a_target() {
        let detector = PdfDetector::new(context(
            window_system("Viewer", 4, title("scan.pdf")),
            inspector(snapshot(4, "viewer.exe")),
        ));
        assert!(detector.is_target(WINDOW).unwrap());

        let detector = PdfDetector::new(context(
            window_system("Viewer", 4, title("Welcome")),
            inspector(snapshot(4, "AcroRd32.exe")),
        ));
        assert!(detector.is_target(WINDOW).unwrap());

        let detector = PdfDetector::new(context(
            window_system("Viewer", 4, title("Welcome")),
            inspector(snapshot(4, "viewer.exe")),
        ));
        assert!(!detector.is_target(WINDOW).unwrap());
    }

    #[test]
    fn resolves_path_from_title_in_process_cwd() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("zz-paper.pdf"), b"%PDF").unwrap();
        let process = ProcessSnapshot {
            cwd: Some(dir.path().to_path_buf()),
            ..snapshot(4, "sumatrapdf.exe")
        };
        let detector = PdfDetector::new(context(
            window_system("SUMATRA_PDF_FRAME", 4, title("zz-paper.pdf - SumatraPDF")),
            inspector(process),
        ));

        let record = detector.resolve(WINDOW).unwrap().unwrap();
        assert_eq!(record.monitor_type, MonitorType::Pdf);
        assert_eq!(
            record.working_directory,
            dir.path().join("zz-paper.pdf").to_string_lossy()
        );
        assert!(!record.is_new_document);
        assert_eq!(record.app_subtype, None);
    }

    #[test]
    fn resolves_path_from_command_line() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("zz-args.pdf");
        fs::write(&file, b"%PDF").unwrap();
        let process = ProcessSnapshot {
            cmdline: vec!["acrord32.exe".into(), file.to_string_lossy().into_owned()],
            ..snapshot(4, "acrord32.exe")
        };
        let detector = PdfDetector::new(context(
            window_system("AcrobatSDIWindow", 4, title("Adobe Acrobat Reader")),
            inspector(process),
        ));

        let record = detector.resolve(WINDOW).unwrap().unwrap();
        assert_eq!(record.working_directory, file.to_string_lossy());
    }

    #[test]
    fn unresolved_path_is_empty() {
        let mut processes = MockProcessInspector::new();
        processes
            .expect_snapshot()
            .returning(|_| Ok(snapshot(4, "evince")));
        processes
            .expect_open_files()
            .returning(|_| Err(anyhow::anyhow!("access denied")));
        let detector = PdfDetector::new(context(
            window_system("Evince", 4, title("zz-missing.pdf")),
            processes,
        ));

        let record = detector.resolve(WINDOW).unwrap().unwrap();
        assert_eq!(record.working_directory, "");
    }
}
