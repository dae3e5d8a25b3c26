//! End-to-end flows over an on-disk directory with the deterministic tile models.

use chrono::NaiveDate;
use rollcall_core::testing::{tile_pipeline, tiles_capture, BLUE, GREEN, RED, WHITE};
use rollcall_core::{
    AttendanceError, BatchAttendance, BatchIdentifier, DirectoryStore, EnrollmentManager,
    EuclideanMatcher, PopulationFilter, Verification, Verifier,
};
use rollcall_store::{NewStudent, SqliteDirectory};

fn enroll_class(dir: &SqliteDirectory) {
    for (id, division) in [("S1", "A"), ("S2", "A"), ("S3", "B"), ("S4", "A")] {
        dir.add_student(&NewStudent {
            student_id: id.into(),
            name: format!("Student {id}"),
            course: "BSc".into(),
            class_year: "FY".into(),
            division: division.into(),
        })
        .unwrap();
    }
    let manager = EnrollmentManager::new(dir);
    let mut pipeline = tile_pipeline();
    manager.enroll(&mut pipeline, "S1", &tiles_capture(&[RED])).unwrap();
    manager.enroll(&mut pipeline, "S2", &tiles_capture(&[GREEN])).unwrap();
    manager.enroll(&mut pipeline, "S3", &tiles_capture(&[BLUE])).unwrap();
}

#[test]
fn enrollment_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("rollcall.db");
    {
        let dir = SqliteDirectory::open(&path).unwrap();
        enroll_class(&dir);
    }

    let dir = SqliteDirectory::open(&path).unwrap();
    assert!(dir.fetch_enrollment_state("S1").unwrap());
    assert!(!dir.fetch_enrollment_state("S4").unwrap());

    let result = Verifier::new(&dir, EuclideanMatcher::default())
        .verify(&mut tile_pipeline(), "S2", &tiles_capture(&[GREEN]))
        .unwrap();
    assert!(result.is_verified());

    let result = Verifier::new(&dir, EuclideanMatcher::default())
        .verify(&mut tile_pipeline(), "S2", &tiles_capture(&[RED]))
        .unwrap();
    assert!(matches!(result, Verification::Mismatch { .. }));
}

#[test]
fn batch_session_records_each_student_once() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = SqliteDirectory::open(tmp.path().join("rollcall.db")).unwrap();
    enroll_class(&dir);
    let date = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();

    let session = BatchAttendance::new(&dir, BatchIdentifier::default());
    let images = [
        tiles_capture(&[RED, WHITE]),
        tiles_capture(&[GREEN, RED]),
        tiles_capture(&[BLUE]),
    ];
    let report = session
        .mark_present(
            &mut tile_pipeline(),
            &PopulationFilter::new("BSc", "FY").with_division("A"),
            "PHY201",
            date,
            &images,
        )
        .unwrap();
    assert_eq!(report.gallery_size, 2);
    assert_eq!(report.outcome.count(), 2);

    // Running the same session again updates rather than duplicates.
    session
        .mark_present(
            &mut tile_pipeline(),
            &PopulationFilter::new("BSc", "FY").with_division("A"),
            "PHY201",
            date,
            &images,
        )
        .unwrap();

    let rows = dir.attendance_for("PHY201", date).unwrap();
    let ids: Vec<&str> = rows.iter().map(|r| r.student_id.as_str()).collect();
    assert_eq!(ids, vec!["S1", "S2"]);
    assert!(rows.iter().all(|r| r.status == "present"));
}

#[test]
fn empty_class_is_reported() {
    let dir = SqliteDirectory::open_in_memory().unwrap();
    enroll_class(&dir);
    let err = BatchAttendance::new(&dir, BatchIdentifier::default())
        .mark_present(
            &mut tile_pipeline(),
            &PopulationFilter::new("BSc", "TY"),
            "PHY201",
            NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(),
            &[tiles_capture(&[RED])],
        )
        .unwrap_err();
    assert!(matches!(err, AttendanceError::NoEnrolledStudents { .. }));
}
