use std::fs;
use std::path::{Path, PathBuf};

use harmonia_core::db::{
    ChronicleRepository, CollectionRepository, Database, EntityRepository, ServiceRepository,
    SqliteChronicleRepository, SqliteCollectionRepository, SqliteEntityRepository,
    SqliteServiceRepository,
};
use harmonia_core::clock::Cursor;
use harmonia_core::models::TaskStatus;
use harmonia_core::{
    CollectionId, CollectionKind, CollectionOutcome, Contact, Event, HarmonizerConfig, ServiceId,
    Task,
};
use pretty_assertions::assert_eq;

use crate::cli::CompletionShell;
use crate::commands::chronicle::{format_delta_lines, format_entry_lines};
use crate::commands::common::{
    format_optional_timestamp, format_timestamp, normalize_content, preview, read_payload,
    resolve_config_path, resolve_db_path,
};
use crate::commands::completions::render_completions;
use crate::commands::config::run_config_init;
use crate::commands::entity::{add_entity, delete_entity, edit_entity, Describe};
use crate::commands::harmonize::{format_report_lines, harmonize_blocking, HarmonizeTarget};
use crate::error::CliError;

fn contacts_collection(dir: &Path) -> (Database, CollectionId) {
    let db = Database::open(dir.join("harmonia.db")).unwrap();
    let account = SqliteServiceRepository::new(db.connection())
        .create("user-1", "Directory", &dir.join("remote").display().to_string())
        .unwrap();
    let collection = SqliteCollectionRepository::new(db.connection())
        .confirm(account.id, CollectionKind::Contacts, "ab", None)
        .unwrap();
    (db, collection.id)
}

#[test]
fn normalize_content_trims_and_rejects_empty() {
    assert_eq!(normalize_content("  {\"a\": 1}  "), Some("{\"a\": 1}".to_string()));
    assert_eq!(normalize_content(" \n\t "), None);
}

#[test]
fn preview_collapses_whitespace_and_truncates() {
    assert_eq!(preview("Ada   \n Lovelace", 20), "Ada Lovelace");
    assert_eq!(preview("abcdefghij", 6), "abc...");
}

#[test]
fn timestamps_render_in_utc() {
    assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
    assert_eq!(format_optional_timestamp(None), "never");
}

#[test]
fn explicit_paths_win_over_defaults() {
    let db_path = PathBuf::from("/tmp/explicit.db");
    let config_path = PathBuf::from("/tmp/explicit.json");
    assert_eq!(resolve_db_path(Some(db_path.clone())), db_path);
    assert_eq!(resolve_config_path(Some(config_path.clone())), config_path);
}

#[test]
fn read_payload_trims_file_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contact.json");
    fs::write(&path, "\n{\"display_name\": \"Ada\"}\n\n").unwrap();
    assert_eq!(read_payload(&path).unwrap(), "{\"display_name\": \"Ada\"}");

    let empty = dir.path().join("empty.json");
    fs::write(&empty, "   ").unwrap();
    assert!(matches!(read_payload(&empty), Err(CliError::EmptyPayload)));
}

#[test]
fn payloads_describe_themselves() {
    assert_eq!(Contact::named("Ada").describe(), "Ada");
    let contact = Contact {
        given_name: Some("Grace".into()),
        family_name: Some("Hopper".into()),
        ..Contact::default()
    };
    assert_eq!(contact.describe(), "Grace Hopper");
    assert_eq!(Contact::default().describe(), "(unnamed)");

    assert_eq!(Event::default().describe(), "(untitled)");

    let task = Task {
        summary: Some("File taxes".into()),
        status: TaskStatus::Completed,
        ..Task::default()
    };
    assert_eq!(task.describe(), "[x] File taxes");
}

#[test]
fn harmonize_target_prefers_service_then_user_then_env() {
    let service = ServiceId(7);
    assert_eq!(
        HarmonizeTarget::resolve(None, Some(service), Some("env".into())).unwrap(),
        HarmonizeTarget::Service(service)
    );
    assert_eq!(
        HarmonizeTarget::resolve(Some("alice".into()), None, Some("env".into())).unwrap(),
        HarmonizeTarget::User("alice".into())
    );
    assert_eq!(
        HarmonizeTarget::resolve(None, None, Some(" env ".into())).unwrap(),
        HarmonizeTarget::User("env".into())
    );
    assert!(matches!(
        HarmonizeTarget::resolve(None, None, Some("  ".into())),
        Err(CliError::MissingTarget)
    ));
}

#[test]
fn entity_commands_record_chronicle() {
    let dir = tempfile::tempdir().unwrap();
    let (db, collection_id) = contacts_collection(dir.path());

    let entity = add_entity::<Contact>(&db, collection_id, r#"{"display_name": "Ada"}"#).unwrap();
    assert_eq!(entity.payload, Contact::named("Ada"));

    edit_entity::<Contact>(&db, entity.id, r#"{"display_name": "Ada Lovelace"}"#).unwrap();
    let repo = SqliteEntityRepository::<Contact>::new(db.connection());
    let edited = repo.fetch(entity.id).unwrap().unwrap();
    assert_eq!(edited.payload.display_name.as_deref(), Some("Ada Lovelace"));
    assert_eq!(edited.uuid, entity.uuid);

    let chronicle = SqliteChronicleRepository::new(db.connection());
    let before = chronicle.apex(collection_id).unwrap();
    edit_entity::<Contact>(&db, entity.id, r#"{"display_name": "Ada Lovelace"}"#).unwrap();
    assert_eq!(chronicle.apex(collection_id).unwrap(), before);

    delete_entity::<Contact>(&db, entity.id).unwrap();
    assert!(repo.fetch(entity.id).unwrap().is_none());
    assert!(matches!(
        delete_entity::<Contact>(&db, entity.id),
        Err(CliError::EntityNotFound(_))
    ));

    let delta = chronicle.delta(collection_id, Some("1"), None, 0).unwrap();
    assert_eq!(delta.deletions.len(), 1);
    let lines = format_delta_lines(&delta);
    assert!(lines[0].starts_with("- "));
    assert!(lines.last().unwrap().starts_with("cursor "));

    let entries = chronicle.entries(collection_id, Cursor::ORIGIN).unwrap();
    let lines = format_entry_lines(&entries);
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("created"));
    assert!(lines[1].contains("modified"));
    assert!(lines[2].contains("deleted"));
}

#[test]
fn add_entity_rejects_invalid_json() {
    let dir = tempfile::tempdir().unwrap();
    let (db, collection_id) = contacts_collection(dir.path());
    assert!(matches!(
        add_entity::<Contact>(&db, collection_id, "not json"),
        Err(CliError::Serialization(_))
    ));
}

#[test]
fn harmonize_pushes_local_contact_to_directory_remote() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("remote/contacts/ab")).unwrap();
    let (db, collection_id) = contacts_collection(dir.path());
    add_entity::<Contact>(&db, collection_id, r#"{"display_name": "Ada"}"#).unwrap();
    let service_id = SqliteCollectionRepository::new(db.connection())
        .fetch(collection_id)
        .unwrap()
        .unwrap()
        .service_id;
    drop(db);

    let report = harmonize_blocking(
        &HarmonizeTarget::Service(service_id),
        HarmonizerConfig::default(),
        &dir.path().join("harmonia.db"),
    )
    .unwrap();

    assert_eq!(report.user_id, "user-1");
    assert_eq!(report.failures(), 0);
    assert_eq!(report.accounts[0].totals().remote_created, 1);
    assert!(matches!(
        report.accounts[0].collections[0].outcome,
        CollectionOutcome::Harmonized { .. }
    ));
    let files = fs::read_dir(dir.path().join("remote/contacts/ab")).unwrap().count();
    assert_eq!(files, 1);

    let lines = format_report_lines(&report);
    assert!(lines[0].contains("+1 ~0 -0 remote"));
}

#[test]
fn harmonize_unknown_service_fails() {
    let dir = tempfile::tempdir().unwrap();
    let result = harmonize_blocking(
        &HarmonizeTarget::Service(ServiceId(99)),
        HarmonizerConfig::default(),
        &dir.path().join("harmonia.db"),
    );
    assert!(matches!(result, Err(CliError::ServiceNotFound(_))));
}

#[test]
fn config_init_refuses_to_overwrite_without_force() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("harmonia.json");

    run_config_init(&path, false).unwrap();
    assert_eq!(
        HarmonizerConfig::load_from_path(&path).unwrap(),
        HarmonizerConfig::default()
    );
    assert!(matches!(run_config_init(&path, false), Err(CliError::Config(_))));
    run_config_init(&path, true).unwrap();
}

#[test]
fn completions_name_the_binary() {
    let script = String::from_utf8(render_completions(CompletionShell::Bash)).unwrap();
    assert!(script.contains("harmonia"));
}
