use std::io::Write;
use std::path::Path;

use isic_submission_ingest::{EntryInfo, ExtractedPdf};
use isic_submission_processor::{ExtractOutcome, JobEvent, ListenStats};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

pub fn print_header(w: &mut dyn Write, path: &Path, size: usize) -> std::io::Result<()> {
    writeln!(w, "{} ({} bytes)", path.display(), size)?;
    writeln!(w)
}

/// Print one line per archive entry, marking PDF candidates.
pub fn print_entries(
    w: &mut dyn Write,
    entries: &[EntryInfo],
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w, "{} entries:", entries.len())?;
    for entry in entries {
        let marker = if entry.is_candidate() { "*" } else { " " };
        let line = format!("{} {:>10}  {}", marker, entry.size, entry.name);
        if !color.enabled() {
            writeln!(w, "{}", line)?;
        } else if entry.is_candidate() {
            writeln!(w, "{}", line.green())?;
        } else {
            writeln!(w, "{}", line.dimmed())?;
        }
    }
    writeln!(w)
}

pub fn print_selected(
    w: &mut dyn Write,
    pdf: &ExtractedPdf,
    color: ColorMode,
) -> std::io::Result<()> {
    let msg = format!(
        "Would extract {} as {} ({} bytes)",
        pdf.entry_name,
        pdf.filename,
        pdf.data.len()
    );
    if color.enabled() {
        writeln!(w, "{}", msg.green().bold())
    } else {
        writeln!(w, "{}", msg)
    }
}

pub fn print_rejected(w: &mut dyn Write, reason: &str, color: ColorMode) -> std::io::Result<()> {
    let msg = format!("Not eligible for automatic extraction: {}", reason);
    if color.enabled() {
        writeln!(w, "{}", msg.yellow())
    } else {
        writeln!(w, "{}", msg)
    }
}

/// Print hook totals followed by the outcome of every extraction job.
pub fn print_summary(
    w: &mut dyn Write,
    stats: &ListenStats,
    events: &[JobEvent],
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(
        w,
        "Received {} scored submissions: {} queued, {} rejected, {} not applicable, {} failed",
        stats.received, stats.queued, stats.rejected, stats.not_applicable, stats.failed
    )?;
    if stats.rejected > 0 || stats.failed > 0 {
        let hint = "(rejected and failed submissions are listed in the log)";
        if color.enabled() {
            writeln!(w, "{}", hint.dimmed())?;
        } else {
            writeln!(w, "{}", hint)?;
        }
    }
    writeln!(w)?;

    for event in events {
        let id = event.submission_id();
        match event {
            JobEvent::Finished {
                outcome: ExtractOutcome::Attached(attached),
                ..
            } => {
                if color.enabled() {
                    writeln!(w, "{} {}", "[ATTACHED]".green().bold(), id)?;
                } else {
                    writeln!(w, "[ATTACHED] {}", id)?;
                }
                writeln!(w, "    {} -> {}", attached.file.name, attached.documentation_url)?;
            }
            JobEvent::Finished {
                outcome: ExtractOutcome::Rejected(rejection),
                ..
            } => {
                if color.enabled() {
                    writeln!(w, "{} {}", "[REJECTED]".yellow().bold(), id)?;
                } else {
                    writeln!(w, "[REJECTED] {}", id)?;
                }
                writeln!(w, "    {}", rejection)?;
            }
            JobEvent::Failed { error, .. } => {
                if color.enabled() {
                    writeln!(w, "{} {}", "[FAILED]".red().bold(), id)?;
                } else {
                    writeln!(w, "[FAILED] {}", id)?;
                }
                writeln!(w, "    {}", error)?;
            }
            JobEvent::Cancelled { .. } => writeln!(w, "[CANCELLED] {}", id)?,
        }
    }
    Ok(())
}
