//! Integration tests for `SqliteStore` against an in-memory database.

use std::collections::HashSet;

use chrono::{Duration, Utc};
use fianza_core::{
  applicant::{ApplicantIdentity, DocType, Role},
  ids::{SEQUENCE_CEILING, format_request_code},
  conversation::{Channel, ConversationState},
  document::{DocumentKind, NewDocument},
  store::{ApplicantQuery, IntakeStore, Registration, StoredUpload},
};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn identity(first: &str, phone: &str) -> ApplicantIdentity {
  ApplicantIdentity {
    first_name: first.into(),
    last_name:  "Gómez".into(),
    phone_e164: phone.into(),
    role:       None,
    document:   None,
  }
}

fn with_document(mut id: ApplicantIdentity, number: &str) -> ApplicantIdentity {
  id.document = Some((DocType::NationalId, number.into()));
  id
}

fn registration(identity: ApplicantIdentity) -> Registration {
  Registration { candidate_id: Uuid::new_v4(), identity, document: None }
}

// ─── Reconciliation ──────────────────────────────────────────────────────────

#[tokio::test]
async fn same_phone_twice_yields_one_applicant() {
  let s = store().await;

  let first = s.register(registration(identity("Ana", "+573001234567"))).await.unwrap();
  let second = s.register(registration(identity("Ana", "+573001234567"))).await.unwrap();

  assert!(first.created);
  assert!(!second.created);
  assert_eq!(first.applicant.applicant_id, second.applicant.applicant_id);
  assert_eq!(first.applicant.request_code, second.applicant.request_code);
  assert_eq!(first.applicant.request_code.as_deref(), Some("SOL-000001"));

  let page = s.list_applicants(&ApplicantQuery::default()).await.unwrap();
  assert_eq!(page.total, 1);
}

#[tokio::test]
async fn candidate_id_is_used_only_on_create() {
  let s = store().await;
  let candidate = Uuid::new_v4();

  let created = s
    .register(Registration {
      candidate_id: candidate,
      identity:     identity("Ana", "+573001234567"),
      document:     None,
    })
    .await
    .unwrap();
  assert_eq!(created.applicant.applicant_id, candidate);

  let merged = s.register(registration(identity("Ana", "+573001234567"))).await.unwrap();
  assert_eq!(merged.applicant.applicant_id, candidate);
}

#[tokio::test]
async fn merge_fills_gaps_without_overwriting() {
  let s = store().await;

  s.register(registration(identity("Ana", "+573001234567"))).await.unwrap();

  let mut update = with_document(identity("María", "+573001234567"), "12345678");
  update.role = Some(Role::CoSigner);
  let merged = s.register(registration(update)).await.unwrap();

  let a = merged.applicant;
  assert_eq!(a.first_name.as_deref(), Some("Ana"));
  assert_eq!(a.doc_type, Some(DocType::NationalId));
  assert_eq!(a.doc_number.as_deref(), Some("12345678"));
  assert_eq!(a.role, Some(Role::CoSigner));

  let stored = s.get_applicant(a.applicant_id).await.unwrap().unwrap();
  assert_eq!(stored.first_name.as_deref(), Some("Ana"));
  assert_eq!(stored.doc_number.as_deref(), Some("12345678"));
}

#[tokio::test]
async fn document_matches_when_phone_does_not() {
  let s = store().await;

  let first = s
    .register(registration(with_document(identity("Ana", "+573001234567"), "12345678")))
    .await
    .unwrap();
  let second = s
    .register(registration(with_document(identity("Ana", "+573009999999"), "12345678")))
    .await
    .unwrap();

  assert!(!second.created);
  assert_eq!(first.applicant.applicant_id, second.applicant.applicant_id);
  assert_eq!(second.applicant.phone_e164, "+573001234567");
}

#[tokio::test]
async fn find_applicant_prefers_phone() {
  let s = store().await;

  let by_phone = s
    .register(registration(identity("Ana", "+573001234567")))
    .await
    .unwrap();
  s.register(registration(with_document(identity("Luis", "+573005555555"), "87654321")))
    .await
    .unwrap();

  let found = s
    .find_applicant("+573001234567", Some((DocType::NationalId, "87654321")))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(found.applicant_id, by_phone.applicant.applicant_id);

  assert!(s.find_applicant("+10000000000", None).await.unwrap().is_none());
}

// ─── Identifiers ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn request_codes_are_sequential_and_unique() {
  let s = store().await;

  let mut codes = Vec::new();
  for i in 0..3 {
    let phone = format!("+5730000000{i}");
    let out = s.register(registration(identity("Ana", &phone))).await.unwrap();
    codes.push(out.applicant.request_code.unwrap());
  }
  assert_eq!(codes, ["SOL-000001", "SOL-000002", "SOL-000003"]);
}

#[tokio::test]
async fn taken_codes_fall_back_to_a_number_above_the_sequence() {
  let s = store().await;

  // Legacy rows hold the next five codes without a number, so every
  // sequential attempt collides on request_code.
  s.with_conn(|conn| {
    for n in 1..=5_i64 {
      conn.execute(
        "INSERT INTO applicants (applicant_id, request_code, phone_e164, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
          Uuid::new_v4().to_string(),
          format_request_code(n),
          format!("+5739000000{n:02}"),
          crate::encode::encode_dt(Utc::now()),
        ],
      )?;
    }
    Ok(())
  })
  .await
  .unwrap();

  let out = s.register(registration(identity("Ana", "+573001234567"))).await.unwrap();
  let request_no = out.applicant.request_no.unwrap();
  assert!(request_no > SEQUENCE_CEILING);
  assert_eq!(out.applicant.request_code, Some(format_request_code(request_no)));

  // The stored row agrees with what was returned.
  let stored = s.get_applicant(out.applicant.applicant_id).await.unwrap().unwrap();
  assert_eq!(stored.request_no, Some(request_no));
  assert_eq!(stored.request_code, out.applicant.request_code);
}

#[tokio::test]
async fn concurrent_registrations_get_distinct_codes() {
  let s = store().await;

  let handles: Vec<_> = (0..10)
    .map(|i| {
      let s = s.clone();
      tokio::spawn(async move {
        let phone = format!("+5731000000{i:02}");
        s.register(registration(identity("Ana", &phone))).await
      })
    })
    .collect();

  let mut codes = HashSet::new();
  for h in handles {
    let out = h.await.unwrap().unwrap();
    assert!(codes.insert(out.applicant.request_code.unwrap()));
  }
  assert_eq!(codes.len(), 10);
}

#[tokio::test]
async fn concurrent_same_phone_converges() {
  let s = store().await;

  let handles: Vec<_> = (0..5)
    .map(|_| {
      let s = s.clone();
      tokio::spawn(async move {
        s.register(registration(identity("Ana", "+573001234567"))).await
      })
    })
    .collect();

  let mut ids = HashSet::new();
  for h in handles {
    ids.insert(h.await.unwrap().unwrap().applicant.applicant_id);
  }
  assert_eq!(ids.len(), 1);
}

// ─── Conversations ───────────────────────────────────────────────────────────

#[tokio::test]
async fn registration_creates_web_conversation() {
  let s = store().await;

  let out = s.register(registration(identity("Ana", "+573001234567"))).await.unwrap();
  let conv = out.conversation;
  assert_eq!(conv.remote_jid, "573001234567@s.whatsapp.net");
  assert_eq!(conv.channel, Channel::Web);
  assert_eq!(conv.state, ConversationState::AwaitingOptIn);
  assert_eq!(conv.applicant_id, out.applicant.applicant_id);
}

#[tokio::test]
async fn re_registration_resets_conversation_state() {
  let s = store().await;

  let first = s.register(registration(identity("Ana", "+573001234567"))).await.unwrap();
  let advanced = s
    .update_conversation_state(
      first.conversation.conversation_id,
      ConversationState::Qualified,
      Some("wamid.1".into()),
    )
    .await
    .unwrap()
    .unwrap();
  assert_eq!(advanced.state, ConversationState::Qualified);
  assert_eq!(advanced.last_message_id.as_deref(), Some("wamid.1"));

  let second = s.register(registration(identity("Ana", "+573001234567"))).await.unwrap();
  assert_eq!(second.conversation.conversation_id, first.conversation.conversation_id);
  assert_eq!(second.conversation.state, ConversationState::AwaitingOptIn);
  assert_eq!(second.conversation.channel, Channel::Web);
}

#[tokio::test]
async fn upsert_conversation_reassigns_existing_jid() {
  let s = store().await;

  let a = s.register(registration(identity("Ana", "+573001234567"))).await.unwrap();
  let b = s.register(registration(identity("Luis", "+573007654321"))).await.unwrap();

  let moved = s
    .upsert_conversation(b.applicant.applicant_id, a.conversation.remote_jid.clone())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(moved.conversation_id, a.conversation.conversation_id);
  assert_eq!(moved.applicant_id, b.applicant.applicant_id);
}

#[tokio::test]
async fn conversation_writes_for_unknown_ids_return_none() {
  let s = store().await;

  let upserted = s
    .upsert_conversation(Uuid::new_v4(), "1@s.whatsapp.net".into())
    .await
    .unwrap();
  assert!(upserted.is_none());

  let updated = s
    .update_conversation_state(Uuid::new_v4(), ConversationState::Closed, None)
    .await
    .unwrap();
  assert!(updated.is_none());
}

// ─── Documents ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn registration_records_uploaded_document() {
  let s = store().await;

  let out = s
    .register(Registration {
      candidate_id: Uuid::new_v4(),
      identity:     identity("Ana", "+573001234567"),
      document:     Some(StoredUpload {
        kind: DocumentKind::IdFront,
        url:  "https://files.example/front.jpg".into(),
      }),
    })
    .await
    .unwrap();

  let doc = out.document.unwrap();
  assert_eq!(doc.applicant_id, out.applicant.applicant_id);
  assert_eq!(s.get_document(doc.document_id).await.unwrap().unwrap().url, doc.url);
}

#[tokio::test]
async fn add_document_for_unknown_applicant_writes_nothing() {
  let s = store().await;

  let result = s
    .add_document(NewDocument {
      applicant_id: Uuid::new_v4(),
      kind:         DocumentKind::Other,
      url:          "https://files.example/x.png".into(),
    })
    .await
    .unwrap();
  assert!(result.is_none());

  let totals = s.activity_totals(Utc::now() - Duration::days(1)).await.unwrap();
  assert_eq!(totals.documents, 0);
}

#[tokio::test]
async fn detail_lists_documents_newest_first() {
  let s = store().await;
  let out = s.register(registration(identity("Ana", "+573001234567"))).await.unwrap();
  let id = out.applicant.applicant_id;

  for kind in [DocumentKind::IdFront, DocumentKind::IdBack] {
    s.add_document(NewDocument { applicant_id: id, kind, url: format!("u/{}", kind.as_ref()) })
      .await
      .unwrap()
      .unwrap();
  }

  let detail = s.get_applicant_detail(id).await.unwrap().unwrap();
  let kinds: Vec<_> = detail.documents.iter().map(|d| d.kind).collect();
  assert_eq!(kinds, [DocumentKind::IdBack, DocumentKind::IdFront]);
  assert_eq!(detail.conversations.len(), 1);

  assert!(s.get_applicant_detail(Uuid::new_v4()).await.unwrap().is_none());
}

// ─── Dashboard queries ───────────────────────────────────────────────────────

#[tokio::test]
async fn list_searches_and_paginates() {
  let s = store().await;

  s.register(registration(identity("Ana", "+573000000001"))).await.unwrap();
  s.register(registration(with_document(identity("Luis", "+573000000002"), "55555555")))
    .await
    .unwrap();
  let last = s.register(registration(identity("Marta", "+573000000003"))).await.unwrap();

  s.add_document(NewDocument {
    applicant_id: last.applicant.applicant_id,
    kind:         DocumentKind::Contract,
    url:          "u/contract".into(),
  })
  .await
  .unwrap();

  let all = s.list_applicants(&ApplicantQuery::default()).await.unwrap();
  assert_eq!(all.total, 3);
  assert_eq!(all.items[0].applicant.first_name.as_deref(), Some("Marta"));
  assert_eq!(all.items[0].document_count, 1);

  let by_name = ApplicantQuery { text: Some("lui".into()), ..Default::default() };
  assert_eq!(s.list_applicants(&by_name).await.unwrap().total, 1);

  let by_doc = ApplicantQuery { text: Some("5555".into()), ..Default::default() };
  assert_eq!(s.list_applicants(&by_doc).await.unwrap().total, 1);

  let by_code = ApplicantQuery { text: Some("SOL-000002".into()), ..Default::default() };
  let page = s.list_applicants(&by_code).await.unwrap();
  assert_eq!(page.items[0].applicant.first_name.as_deref(), Some("Luis"));

  let by_number = ApplicantQuery { text: Some("3".into()), ..Default::default() };
  let page = s.list_applicants(&by_number).await.unwrap();
  assert!(page.items.iter().any(|i| i.applicant.request_no == Some(3)));

  let by_code_lower = ApplicantQuery { text: Some("sol-000002".into()), ..Default::default() };
  assert_eq!(s.list_applicants(&by_code_lower).await.unwrap().total, 1);

  let literal = ApplicantQuery { text: Some("%".into()), ..Default::default() };
  assert_eq!(s.list_applicants(&literal).await.unwrap().total, 0);

  let paged = ApplicantQuery { text: None, page: 2, page_size: 2 };
  let page = s.list_applicants(&paged).await.unwrap();
  assert_eq!(page.items.len(), 1);
  assert_eq!(page.total_pages, 2);
  assert_eq!(page.items[0].applicant.first_name.as_deref(), Some("Ana"));
}

#[tokio::test]
async fn search_folds_accented_letters_in_either_case() {
  let s = store().await;

  let mut id = identity("Ángela", "+573000000001");
  id.last_name = "Gómez".into();
  s.register(registration(id)).await.unwrap();
  s.register(registration(identity("Luis", "+573000000002"))).await.unwrap();

  for text in ["ángela", "ÁNGELA", "gÓmez", "GÓMEZ"] {
    let query = ApplicantQuery { text: Some(text.into()), ..Default::default() };
    let page = s.list_applicants(&query).await.unwrap();
    let expected = if text.to_lowercase().starts_with('á') { 1 } else { 2 };
    assert_eq!(page.total, expected, "query {text:?}");
  }
}

// ─── Statistics ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn stats_count_recent_activity() {
  let s = store().await;

  s.register(registration(identity("Ana", "+573000000001"))).await.unwrap();
  s.register(registration(identity("Luis", "+573000000002"))).await.unwrap();

  let since = Utc::now() - Duration::days(30);
  let daily = s.daily_registrations(since).await.unwrap();
  assert_eq!(daily.iter().map(|d| d.count).sum::<u64>(), 2);
  assert_eq!(daily.last().unwrap().day, Utc::now().date_naive());

  let totals = s.activity_totals(since).await.unwrap();
  assert_eq!(totals.applicants, 2);
  assert_eq!(totals.conversations, 2);
  assert_eq!(totals.documents, 0);

  let future = s.activity_totals(Utc::now() + Duration::days(1)).await.unwrap();
  assert_eq!(future.applicants, 0);
}
