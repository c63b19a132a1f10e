use chrono::Duration;
use gxp_core::model::{
    AnswerState, AssessmentId, AssessmentKind, AssessmentRef, ComplianceReport, DepartmentDraft,
    DepartmentId, EnterpriseDraft, EnterpriseId, FacilityDraft, FacilityId, InvitationDraft,
    ProgressSnapshot, Question, QuestionId, QuestionSet, ReportAuthor, ResponseMap, SnapshotId,
    UserDraft, UserId, UserRole,
};
use gxp_core::time::fixed_now;
use std::collections::BTreeMap;
use storage::repository::{
    DepartmentRepository, EnterpriseRepository, FacilityRepository, InvitationRepository,
    ProgressRepository, QuestionRepository, ReportRepository, SeatReservation, StorageError,
    UserRepository,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    SqliteRepository::open(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("open")
}

fn template(facility: &str) -> AssessmentRef {
    AssessmentRef::new(
        AssessmentKind::Template,
        AssessmentId::new("qu_sub_1"),
        "Quality Unit",
    )
    .unwrap()
    .with_facility(FacilityId::new(facility), format!("Plant {facility}"))
}

fn responses() -> ResponseMap {
    let mut map = ResponseMap::new();
    map.answer(QuestionId::new("q1"), AnswerState::Compliant);
    map.answer(QuestionId::new("q2"), AnswerState::NonCompliant);
    map
}

fn texts() -> BTreeMap<QuestionId, String> {
    [("q1", "Is the SOP current?"), ("q2", "Are deviations logged?")]
        .into_iter()
        .map(|(id, text)| (QuestionId::new(id), text.to_string()))
        .collect()
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let repo = connect("memdb_migrate_twice").await;
    repo.migrate().await.expect("second migrate");
}

#[tokio::test]
async fn questions_round_trip_in_ordinal_order() {
    let repo = connect("memdb_questions").await;
    let assessment = AssessmentId::new("custom_1");
    let set = QuestionSet::new(vec![
        Question::new(QuestionId::new("b"), "Second", 2).unwrap(),
        Question::new(QuestionId::new("a"), "First", 1).unwrap(),
    ])
    .unwrap();

    assert!(repo.get_questions(&assessment).await.unwrap().is_none());
    repo.save_questions(&assessment, &set).await.unwrap();

    let loaded = repo.get_questions(&assessment).await.unwrap().unwrap();
    assert_eq!(loaded, set.as_slice());

    let replacement =
        QuestionSet::new(vec![Question::new(QuestionId::new("c"), "Only", 1).unwrap()]).unwrap();
    repo.save_questions(&assessment, &replacement).await.unwrap();
    assert_eq!(repo.get_questions(&assessment).await.unwrap().unwrap().len(), 1);
}

#[tokio::test]
async fn snapshot_upsert_updates_in_place() {
    let repo = connect("memdb_snapshots").await;
    let owner = UserId::new("u1");

    let first = ProgressSnapshot::new(template("f1"), 2, 3, &responses(), texts(), fixed_now())
        .with_owner(owner.clone());
    let id = repo.save_snapshot(&first).await.unwrap();

    let stored = repo.get_snapshot(&id).await.unwrap().unwrap();
    assert_eq!(stored.current_index, 2);
    assert_eq!(stored.total_questions, 3);
    assert_eq!(stored.decoded_responses().responses, responses());
    assert_eq!(stored.question_texts, texts());
    assert_eq!(stored.assessment, template("f1"));

    // Without an id the owner's record for the same assessment is reused.
    let later = fixed_now() + Duration::minutes(10);
    let second = ProgressSnapshot::new(template("f1"), 1, 3, &responses(), texts(), later)
        .with_owner(owner.clone());
    assert_eq!(repo.save_snapshot(&second).await.unwrap(), id);

    // With an id the record is updated and keeps its creation time.
    let third = ProgressSnapshot::new(template("f1"), 0, 3, &ResponseMap::new(), texts(), later)
        .with_owner(owner.clone())
        .with_id(id.clone());
    assert_eq!(repo.save_snapshot(&third).await.unwrap(), id);

    let stored = repo.get_snapshot(&id).await.unwrap().unwrap();
    assert_eq!(stored.current_index, 0);
    assert!(stored.responses.is_empty());
    assert_eq!(stored.created_at, fixed_now());
    assert_eq!(stored.updated_at, later);

    let other_facility =
        ProgressSnapshot::new(template("f2"), 1, 3, &responses(), texts(), later + Duration::minutes(1))
            .with_owner(owner.clone());
    let other = repo.save_snapshot(&other_facility).await.unwrap();
    assert_ne!(other, id);

    let listed = repo.list_snapshots(&owner).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id.as_ref(), Some(&other));

    let found = repo.find_snapshot(&owner, &template("f1")).await.unwrap().unwrap();
    assert_eq!(found.id.as_ref(), Some(&id));

    repo.delete_snapshot(&id).await.unwrap();
    assert!(repo.get_snapshot(&id).await.unwrap().is_none());
    assert!(matches!(
        repo.delete_snapshot(&id).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn snapshot_of_another_owner_is_rejected() {
    let repo = connect("memdb_snapshot_owner").await;
    let snapshot = ProgressSnapshot::new(template("f1"), 0, 3, &responses(), texts(), fixed_now())
        .with_owner(UserId::new("u1"));
    let id = repo.save_snapshot(&snapshot).await.unwrap();

    let hijack = snapshot.with_owner(UserId::new("u2")).with_id(id);
    assert!(matches!(
        repo.save_snapshot(&hijack).await,
        Err(StorageError::PermissionDenied(_))
    ));

    let ghost = ProgressSnapshot::new(template("f1"), 0, 3, &responses(), texts(), fixed_now())
        .with_owner(UserId::new("u1"))
        .with_id(SnapshotId::new("missing"));
    assert!(matches!(
        repo.save_snapshot(&ghost).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn reports_persist_counts_and_list_newest_first() {
    let repo = connect("memdb_reports").await;
    let mut author = ReportAuthor::new(UserId::new("u1"), "qa@acme.test", "QA Lead");
    author.enterprise_id = Some(EnterpriseId::new("e1"));

    let older = ComplianceReport::from_responses(
        author.clone(),
        template("f1"),
        &responses(),
        texts(),
        3,
        fixed_now(),
    )
    .unwrap();
    let newer = ComplianceReport::from_responses(
        author,
        template("f2"),
        &responses(),
        texts(),
        2,
        fixed_now() + Duration::hours(1),
    )
    .unwrap();

    let older_id = repo.insert_report(&older).await.unwrap();
    let newer_id = repo.insert_report(&newer).await.unwrap();

    let fetched = repo.get_report(&older_id).await.unwrap().unwrap();
    assert_eq!(fetched.counts(), older.counts());
    assert_eq!(fetched.total_questions(), 3);
    assert_eq!(fetched.compliance_percentage(), 50);
    assert_eq!(fetched.responses, older.responses);

    let mine = repo.list_reports_for_user(&UserId::new("u1")).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].id.as_ref(), Some(&newer_id));

    let enterprise = repo
        .list_reports_for_enterprise(&EnterpriseId::new("e1"))
        .await
        .unwrap();
    assert_eq!(enterprise.len(), 2);
}

#[tokio::test]
async fn directory_records_round_trip() {
    let repo = connect("memdb_directory").await;
    let root = UserId::new("root");

    let mut enterprise = EnterpriseDraft {
        company_name: "Acme Pharma".into(),
        contact_email: "ops@acme.test".into(),
        admin_email: "admin@acme.test".into(),
        admin_name: "Pat".into(),
        user_limit: Some(2),
        ..EnterpriseDraft::default()
    }
    .validate(EnterpriseId::new("e1"), root.clone(), fixed_now())
    .unwrap();
    repo.upsert_enterprise(&enterprise).await.unwrap();

    enterprise.reserve_seat().unwrap();
    repo.upsert_enterprise(&enterprise).await.unwrap();
    let fetched = repo.get_enterprise(&enterprise.id).await.unwrap().unwrap();
    assert_eq!(fetched, enterprise);
    assert_eq!(fetched.capacity_percentage(), 50);

    let facility = FacilityDraft {
        name: "Plant 1".into(),
        description: String::new(),
    }
    .validate(FacilityId::new("f1"), enterprise.id.clone(), root.clone(), fixed_now())
    .unwrap();
    repo.upsert_facility(&facility).await.unwrap();
    assert_eq!(
        repo.list_facilities(&enterprise.id).await.unwrap(),
        vec![facility.clone()]
    );

    let department = DepartmentDraft {
        name: "Quality".into(),
        description: "QA".into(),
        allowed_domains: vec!["qu".into(), "lab".into()],
    }
    .validate(DepartmentId::new("d1"), enterprise.id.clone(), fixed_now())
    .unwrap();
    repo.upsert_department(&department).await.unwrap();
    assert_eq!(
        repo.get_department(&department.id).await.unwrap(),
        Some(department.clone())
    );

    let mut draft = InvitationDraft {
        email: "new@acme.test".into(),
        display_name: "New Hire".into(),
        ..InvitationDraft::default()
    };
    draft.permissions.set_view_all(true);
    let user = UserDraft {
        email: "new@acme.test".into(),
        display_name: "New Hire".into(),
        role: UserRole::User,
        department: "Quality".into(),
        job_title: "Analyst".into(),
        permissions: Some(draft.permissions),
    }
    .validate(
        UserId::new("u1"),
        Some(enterprise.id.clone()),
        Some(root.clone()),
        fixed_now(),
    )
    .unwrap();
    repo.upsert_user(&user).await.unwrap();

    let by_email = repo.find_user_by_email("NEW@acme.test").await.unwrap().unwrap();
    assert_eq!(by_email, user);
    assert!(
        by_email
            .permissions
            .is_some_and(|p| p.can_view_department_assessments())
    );

    let clash = UserDraft {
        email: "new@acme.test".into(),
        display_name: "Duplicate".into(),
        role: UserRole::User,
        department: String::new(),
        job_title: String::new(),
        permissions: None,
    }
    .validate(UserId::new("u2"), None, None, fixed_now())
    .unwrap();
    assert!(matches!(
        repo.upsert_user(&clash).await,
        Err(StorageError::Conflict)
    ));

    // Facilities and departments go with their enterprise.
    repo.delete_enterprise(&enterprise.id).await.unwrap();
    assert!(repo.get_facility(&facility.id).await.unwrap().is_none());
    assert!(repo.list_departments(&enterprise.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn seats_are_taken_only_below_the_limit() {
    let repo = connect("memdb_seats").await;
    let enterprise = EnterpriseDraft {
        company_name: "Acme Pharma".into(),
        contact_email: "ops@acme.test".into(),
        admin_email: "admin@acme.test".into(),
        admin_name: "Pat".into(),
        user_limit: Some(1),
        ..EnterpriseDraft::default()
    }
    .validate(EnterpriseId::new("e1"), UserId::new("root"), fixed_now())
    .unwrap();
    repo.upsert_enterprise(&enterprise).await.unwrap();

    let SeatReservation::Reserved(taken) = repo.reserve_seat(&enterprise.id).await.unwrap() else {
        panic!("first seat should be free");
    };
    assert_eq!(taken.current_user_count, 1);
    assert_eq!(
        repo.reserve_seat(&enterprise.id).await.unwrap(),
        SeatReservation::Full { limit: 1 }
    );

    repo.release_seat(&enterprise.id).await.unwrap();
    repo.release_seat(&enterprise.id).await.unwrap();
    let fetched = repo.get_enterprise(&enterprise.id).await.unwrap().unwrap();
    assert_eq!(fetched.current_user_count, 0);

    let missing = EnterpriseId::new("nope");
    assert!(matches!(
        repo.reserve_seat(&missing).await,
        Err(StorageError::NotFound)
    ));
    assert!(matches!(
        repo.release_seat(&missing).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn inserting_an_existing_user_conflicts() {
    let repo = connect("memdb_insert_user").await;
    let draft = || UserDraft {
        email: "a@acme.test".into(),
        display_name: "Inspector".into(),
        role: UserRole::User,
        department: String::new(),
        job_title: String::new(),
        permissions: None,
    };
    let user = draft()
        .validate(UserId::new("u1"), None, None, fixed_now())
        .unwrap();
    repo.insert_user(&user).await.unwrap();

    assert!(matches!(
        repo.insert_user(&user).await,
        Err(StorageError::Conflict)
    ));
    let other = draft()
        .validate(UserId::new("u2"), None, None, fixed_now())
        .unwrap();
    assert!(matches!(
        repo.insert_user(&other).await,
        Err(StorageError::Conflict)
    ));
    assert!(repo.get_user(&UserId::new("u2")).await.unwrap().is_none());
}

#[tokio::test]
async fn invitations_track_usage() {
    let repo = connect("memdb_invitations").await;
    let invitation = InvitationDraft {
        email: "new@acme.test".into(),
        display_name: "New Hire".into(),
        ..InvitationDraft::default()
    }
    .issue(
        EnterpriseId::new("e1"),
        UserId::new("admin"),
        fixed_now(),
        Duration::days(7),
    )
    .unwrap();

    repo.insert_invitation(&invitation).await.unwrap();
    assert!(matches!(
        repo.insert_invitation(&invitation).await,
        Err(StorageError::Conflict)
    ));

    let by_token = repo
        .get_invitation_by_token(&invitation.token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_token, invitation);

    let used_at = fixed_now() + Duration::days(1);
    repo.mark_invitation_used(&invitation.id, used_at).await.unwrap();
    assert!(
        repo.get_invitation_by_token(&invitation.token)
            .await
            .unwrap()
            .is_none()
    );
    let stored = repo.get_invitation(&invitation.id).await.unwrap().unwrap();
    assert_eq!(stored.used_at, Some(used_at));

    assert_eq!(
        repo.list_invitations(&EnterpriseId::new("e1")).await.unwrap().len(),
        1
    );
    repo.delete_invitation(&invitation.id).await.unwrap();
    assert!(matches!(
        repo.delete_invitation(&invitation.id).await,
        Err(StorageError::NotFound)
    ));
}
