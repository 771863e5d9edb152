use repokit_core::{
    DbError, FieldCriterion, Operator, Record, RepoError, Repository, SharedHandle,
    SortDirection, SqliteHandle, TableRepository, Value,
};

struct UserRepository {
    handle: SharedHandle,
}

impl Repository for UserRepository {
    fn table_name(&self) -> &str {
        "users"
    }

    fn handle(&self) -> &SharedHandle {
        &self.handle
    }
}

fn shared_handle() -> SharedHandle {
    let handle = SqliteHandle::open_in_memory().unwrap();
    handle
        .execute_batch(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                status TEXT,
                age INTEGER,
                created_at INTEGER
            );",
        )
        .unwrap();
    handle.into_shared()
}

fn user(name: &str, status: &str, age: i64, created_at: i64) -> Record {
    Record::new()
        .with("name", name.to_string())
        .with("status", status.to_string())
        .with("age", age)
        .with("created_at", created_at)
}

fn seeded() -> UserRepository {
    let repo = UserRepository {
        handle: shared_handle(),
    };
    repo.insert(&user("Ann", "active", 25, 100)).unwrap();
    repo.insert(&user("Bob", "active", 41, 300)).unwrap();
    repo.insert(&user("Cid", "inactive", 52, 200)).unwrap();
    repo.insert(&user("Dee", "active", 33, 400)).unwrap();
    repo
}

fn names(records: &[Record]) -> Vec<&str> {
    records
        .iter()
        .map(|record| record.get_text("name").unwrap())
        .collect()
}

#[test]
fn insert_then_last_insert_id_then_find() {
    let repo = UserRepository {
        handle: shared_handle(),
    };

    let affected = repo
        .insert(&Record::new().with("name", "Alice".to_string()))
        .unwrap();
    assert_eq!(affected, 1);

    let id = repo.last_insert_id().unwrap();
    let found = repo.find(id.into()).unwrap().expect("inserted row should be found");
    assert_eq!(found.get_text("name"), Some("Alice"));
    assert_eq!(found.get_integer("id"), Some(id));
}

#[test]
fn find_missing_id_returns_none() {
    let repo = seeded();
    assert!(repo.find(Value::Integer(9_999)).unwrap().is_none());
}

#[test]
fn update_and_delete_report_affected_rows() {
    let repo = seeded();

    let changed = repo
        .update(
            &Record::new().with("status", "archived".to_string()),
            &Record::new().with("status", "active".to_string()),
        )
        .unwrap();
    assert_eq!(changed, 3);

    let removed = repo
        .delete(
            &Record::new()
                .with("status", "archived".to_string())
                .with("name", "Bob".to_string()),
        )
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(repo.find_all(None).unwrap().len(), 3);
}

#[test]
fn find_by_fields_builds_conjunctive_filter() {
    let repo = seeded();
    let fields = vec![
        FieldCriterion::new("status", "active".to_string()),
        FieldCriterion::new("age", 30_i64).with_operator(Operator::Gt),
    ];

    let matches = repo.find_all_by_fields(&fields, 0).unwrap();
    assert_eq!(names(&matches), vec!["Bob", "Dee"]);

    let first = repo.find_by_fields(&fields, 1).unwrap().unwrap();
    assert_eq!(first.get_text("name"), Some("Bob"));
}

#[test]
fn find_by_fields_without_criteria_matches_find_all() {
    let repo = seeded();

    let unfiltered = repo.find_all_by_fields(&[], 2).unwrap();
    assert_eq!(unfiltered, repo.find_all(Some(2)).unwrap());

    let skipped_only = vec![
        FieldCriterion::new("", "x".to_string()),
        FieldCriterion::new("status", Value::Null),
    ];
    let first = repo.find_by_fields(&skipped_only, 1).unwrap();
    assert_eq!(first.as_ref(), repo.find_all(Some(1)).unwrap().first());
}

#[test]
fn find_by_supports_operators_and_limits() {
    let repo = seeded();

    let young = repo
        .find_by("age", Value::Integer(30), 1, Operator::Lt)
        .unwrap()
        .unwrap();
    assert_eq!(young.get_text("name"), Some("Ann"));

    let pattern = repo
        .find_by("name", Value::Text("D%".into()), 1, "like".parse().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(pattern.get_text("name"), Some("Dee"));

    assert!(repo
        .find_by("status", Value::Text("gone".into()), 0, Operator::Eq)
        .unwrap()
        .is_none());
}

#[test]
fn find_all_ordered_by_sorts_then_limits() {
    let repo = seeded();

    let latest = repo
        .find_all_ordered_by("created_at", SortDirection::from_ascending(false), Some(2))
        .unwrap();
    assert_eq!(names(&latest), vec!["Dee", "Bob"]);

    let all = repo
        .find_all_ordered_by("created_at", SortDirection::Ascending, None)
        .unwrap();
    assert_eq!(names(&all), vec!["Ann", "Cid", "Bob", "Dee"]);
}

#[test]
fn zero_limit_on_listings_returns_no_rows() {
    let repo = seeded();

    assert!(repo.find_all(Some(0)).unwrap().is_empty());
    assert!(repo
        .find_all_ordered_by("created_at", SortDirection::Descending, Some(0))
        .unwrap()
        .is_empty());

    assert_eq!(repo.find_all_by_fields(&[], 0).unwrap().len(), 4);
    assert!(repo.find_by_fields(&[], 0).unwrap().is_some());
}

#[test]
fn lookups_work_through_a_trait_object() {
    let repo = seeded();
    let generic: &dyn Repository = &repo;

    let found = generic
        .find_by("name", Value::Text("Cid".into()), 1, Operator::Eq)
        .unwrap()
        .unwrap();
    let id = found.get_integer("id").unwrap();
    assert_eq!(generic.find(Value::Integer(id)).unwrap(), Some(found));
}

#[test]
fn untrusted_identifiers_fail_before_reaching_sql() {
    let repo = seeded();

    let err = repo
        .find_all_ordered_by("created_at; DROP TABLE users", SortDirection::Ascending, None)
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidIdentifier(_)));

    let fields = vec![FieldCriterion::new("1=1 OR name", "x".to_string())];
    let err = repo.find_by_fields(&fields, 1).unwrap_err();
    assert!(matches!(err, RepoError::InvalidIdentifier(_)));

    assert_eq!(repo.find_all(None).unwrap().len(), 4);
}

#[test]
fn values_are_bound_not_interpolated() {
    let repo = seeded();
    let hostile = "x' OR '1'='1".to_string();

    let result = repo
        .find_by_fields(&[FieldCriterion::new("name", hostile.clone())], 0)
        .unwrap();
    assert!(result.is_none());

    repo.insert(&Record::new().with("name", hostile.clone())).unwrap();
    let stored = repo
        .find_by("name", Value::Text(hostile.clone()), 1, Operator::Eq)
        .unwrap()
        .unwrap();
    assert_eq!(stored.get_text("name"), Some(hostile.as_str()));
}

#[test]
fn database_errors_propagate_unchanged() {
    let repo = seeded();

    let err = repo
        .insert(&Record::new().with("status", "active".to_string()))
        .unwrap_err();
    assert!(matches!(err, RepoError::Db(DbError::Sqlite(_))));

    let err = repo
        .find_by("no_such_column", Value::Integer(1), 1, Operator::Eq)
        .unwrap_err();
    assert!(matches!(err, RepoError::Db(DbError::Sqlite(_))));
}

#[test]
fn repositories_share_one_connection() {
    let handle = shared_handle();
    let users = UserRepository {
        handle: handle.clone(),
    };
    let generic = TableRepository::new(handle, "users");

    users.insert(&user("Eve", "active", 29, 500)).unwrap();
    let id = generic.last_insert_id().unwrap();
    let found = generic.find(id.into()).unwrap().unwrap();
    assert_eq!(found.get_text("name"), Some("Eve"));
}
