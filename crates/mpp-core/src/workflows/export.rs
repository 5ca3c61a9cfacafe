use crate::core::models::configuration::MarksConfiguration;
use crate::core::models::ids::MarkId;
use crate::core::models::mark::MarkKind;
use crate::engine::error::EngineError;
use crate::engine::feedback::{ConfigurationSnapshot, IterationRecord};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// One mark of one snapshot, flattened for CSV.
#[derive(Debug, Serialize)]
struct SnapshotRow {
    iteration: u64,
    energy: f64,
    id: MarkId,
    kind: MarkKind,
    center_x: f64,
    center_y: f64,
    center_z: f64,
    size_x: f64,
    size_y: f64,
    size_z: f64,
    angle: Option<f64>,
}

pub fn write_trace<W: Write>(writer: W, records: &[IterationRecord]) -> Result<(), EngineError> {
    let mut csv = csv::Writer::from_writer(writer);
    for record in records {
        csv.serialize(record)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_marks<W: Write>(
    writer: W,
    configuration: &MarksConfiguration,
) -> Result<(), EngineError> {
    let mut csv = csv::Writer::from_writer(writer);
    for record in configuration.records() {
        csv.serialize(record)?;
    }
    csv.flush()?;
    Ok(())
}

/// Writes every snapshot as one row per mark, tagged with the snapshot's iteration and energy.
pub fn write_snapshots<W: Write>(
    writer: W,
    snapshots: &[ConfigurationSnapshot],
) -> Result<(), EngineError> {
    let mut csv = csv::Writer::from_writer(writer);
    for snapshot in snapshots {
        for mark in &snapshot.marks {
            csv.serialize(SnapshotRow {
                iteration: snapshot.iteration,
                energy: snapshot.energy,
                id: mark.id,
                kind: mark.kind,
                center_x: mark.center_x,
                center_y: mark.center_y,
                center_z: mark.center_z,
                size_x: mark.size_x,
                size_y: mark.size_y,
                size_z: mark.size_z,
                angle: mark.angle,
            })?;
        }
    }
    csv.flush()?;
    Ok(())
}

pub fn write_trace_file(path: &Path, records: &[IterationRecord]) -> Result<(), EngineError> {
    debug!(path = %path.display(), rows = records.len(), "Writing energy trace");
    write_trace(std::fs::File::create(path)?, records)
}

pub fn write_marks_file(path: &Path, configuration: &MarksConfiguration) -> Result<(), EngineError> {
    debug!(path = %path.display(), marks = configuration.len(), "Writing marks");
    write_marks(std::fs::File::create(path)?, configuration)
}

pub fn write_snapshots_file(
    path: &Path,
    snapshots: &[ConfigurationSnapshot],
) -> Result<(), EngineError> {
    debug!(path = %path.display(), snapshots = snapshots.len(), "Writing configuration snapshots");
    write_snapshots(std::fs::File::create(path)?, snapshots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::mark::Mark;
    use crate::engine::feedback::IterationOutcome;
    use crate::engine::kernels::KernelKind;
    use nalgebra::Point3;

    #[test]
    fn write_marks_emits_header_and_one_row_per_mark() {
        let configuration = MarksConfiguration::from_marks([
            Mark::sphere(Point3::new(1.0, 2.0, 0.5), 1.5),
            Mark::ellipsoid(Point3::new(4.0, 4.0, 0.5), [2.0, 1.0, 1.0], 0.25),
        ]);
        let mut buffer = Vec::new();
        write_marks(&mut buffer, &configuration).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "id,kind,center_x,center_y,center_z,size_x,size_y,size_z,angle"
        );
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("0,sphere,1.0,2.0,0.5,1.5"));
        assert!(lines[1].ends_with(','));
        assert!(lines[2].contains("ellipsoid"));
        assert!(lines[2].ends_with("0.25"));
    }

    #[test]
    fn write_trace_serializes_optional_fields_as_empty() {
        let records = vec![
            IterationRecord {
                iteration: 1,
                kernel: Some(KernelKind::Birth),
                outcome: IterationOutcome::Accepted,
                delta: Some(-2.0),
                energy: -2.0,
                temperature: 1.0,
                marks: 1,
            },
            IterationRecord {
                iteration: 2,
                kernel: Some(KernelKind::Death),
                outcome: IterationOutcome::NoProposal,
                delta: None,
                energy: -2.0,
                temperature: 0.5,
                marks: 1,
            },
        ];
        let mut buffer = Vec::new();
        write_trace(&mut buffer, &records).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "iteration,kernel,outcome,delta,energy,temperature,marks");
        assert_eq!(lines[1], "1,birth,accepted,-2.0,-2.0,1.0,1");
        assert_eq!(lines[2], "2,death,no-proposal,,-2.0,0.5,1");
    }

    #[test]
    fn write_snapshots_flattens_marks() {
        let configuration =
            MarksConfiguration::from_marks([Mark::sphere(Point3::new(1.0, 1.0, 0.5), 1.0)]);
        let snapshots = vec![ConfigurationSnapshot {
            iteration: 10,
            energy: -1.5,
            marks: configuration.records(),
        }];
        let mut buffer = Vec::new();
        write_snapshots(&mut buffer, &snapshots).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.lines().nth(1).unwrap().starts_with("10,-1.5,0,sphere"));
    }
}
