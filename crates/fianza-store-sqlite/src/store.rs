//! [`SqliteStore`]: the SQLite implementation of [`IntakeStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{
  Connection, OptionalExtension as _, TransactionBehavior, functions::FunctionFlags,
};
use uuid::Uuid;

use fianza_core::{
  applicant::{Applicant, ApplicantIdentity, DocType},
  conversation::{Conversation, ConversationState, remote_jid_for_phone},
  document::{Document, DocumentKind, NewDocument},
  ids::{MAX_SEQUENCE_ATTEMPTS, SEQUENCE_CEILING, fallback_request_no},
  store::{
    ActivityTotals, ApplicantDetail, ApplicantPage, ApplicantQuery, ApplicantSummary,
    DailyCount, IntakeStore, Registration, RegistrationOutcome,
  },
};

use crate::{
  encode::{
    APPLICANT_COLUMNS, CONVERSATION_COLUMNS, DOCUMENT_COLUMNS, RawApplicant,
    RawConversation, RawDocument, decode_daily_count, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An intake store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. All
/// statements run on the connection's dedicated thread, one closure at a time.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        register_functions(conn)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` on the connection thread, keeping this crate's error type.
  pub(crate) async fn with_conn<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self
      .conn
      .call(move |conn| f(conn).map_err(Error::into_call))
      .await
      .map_err(Error::from_call)
  }
}

/// SQL name of the Unicode lower-casing function used by search.
const FOLD_FN: &str = "fold_case";

/// Register `fold_case(text)`. SQLite's own `lower()` and `LIKE` only fold
/// ASCII, so `Á` and `á` would not match.
fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
  conn.create_scalar_function(
    FOLD_FN,
    1,
    FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
    |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|s| fold_case(&s))),
  )
}

fn fold_case(text: &str) -> String { text.to_lowercase() }

// ─── Row helpers (run on the connection thread) ──────────────────────────────

fn select_applicant<P: rusqlite::Params>(
  conn: &Connection,
  clause: &str,
  params: P,
) -> Result<Option<Applicant>> {
  let sql = format!("SELECT {APPLICANT_COLUMNS} FROM applicants WHERE {clause}");
  conn
    .query_row(&sql, params, RawApplicant::from_row)
    .optional()?
    .map(RawApplicant::into_applicant)
    .transpose()
}

fn applicant_exists(conn: &Connection, id: Uuid) -> Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM applicants WHERE applicant_id = ?1",
        [encode_uuid(id)],
        |_| Ok(true),
      )
      .optional()?
      .unwrap_or(false),
  )
}

/// Phone first; document second, oldest match wins.
fn find_applicant_in(
  conn: &Connection,
  phone_e164: &str,
  document: Option<(DocType, &str)>,
) -> Result<Option<Applicant>> {
  if let Some(found) = select_applicant(conn, "phone_e164 = ?1", [phone_e164])? {
    return Ok(Some(found));
  }
  match document {
    Some((doc_type, doc_number)) => select_applicant(
      conn,
      "doc_type = ?1 AND doc_number = ?2 ORDER BY created_at LIMIT 1",
      rusqlite::params![doc_type.as_ref(), doc_number],
    ),
    None => Ok(None),
  }
}

fn insert_applicant(conn: &Connection, a: &Applicant) -> Result<()> {
  conn.execute(
    "INSERT INTO applicants (
       applicant_id, request_no, request_code, first_name, last_name,
       phone_e164, doc_type, doc_number, role, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    rusqlite::params![
      encode_uuid(a.applicant_id),
      a.request_no,
      a.request_code,
      a.first_name,
      a.last_name,
      a.phone_e164,
      a.doc_type.as_ref().map(AsRef::<str>::as_ref),
      a.doc_number,
      a.role.as_ref().map(AsRef::<str>::as_ref),
      encode_dt(a.created_at),
    ],
  )?;
  Ok(())
}

/// Persist the mergeable attributes. Phone and identifiers are not written.
fn update_applicant_fields(conn: &Connection, a: &Applicant) -> Result<()> {
  conn.execute(
    "UPDATE applicants
        SET first_name = ?2, last_name = ?3, doc_type = ?4, doc_number = ?5, role = ?6
      WHERE applicant_id = ?1",
    rusqlite::params![
      encode_uuid(a.applicant_id),
      a.first_name,
      a.last_name,
      a.doc_type.as_ref().map(AsRef::<str>::as_ref),
      a.doc_number,
      a.role.as_ref().map(AsRef::<str>::as_ref),
    ],
  )?;
  Ok(())
}

fn merge(conn: &Connection, mut existing: Applicant, identity: &ApplicantIdentity) -> Result<Applicant> {
  if existing.fill_missing(identity) {
    update_applicant_fields(conn, &existing)?;
  }
  Ok(existing)
}

/// Find-or-create-or-merge. Returns the applicant and whether it was created.
fn reconcile(
  conn: &Connection,
  candidate_id: Uuid,
  identity: &ApplicantIdentity,
) -> Result<(Applicant, bool)> {
  let document = identity.document.as_ref().map(|(t, n)| (*t, n.as_str()));
  if let Some(existing) = find_applicant_in(conn, &identity.phone_e164, document)? {
    return Ok((merge(conn, existing, identity)?, false));
  }

  let fresh = Applicant::from_identity(candidate_id, identity);
  match insert_applicant(conn, &fresh) {
    Ok(()) => Ok((fresh, true)),
    Err(e) if e.is_unique_violation_on("applicants.phone_e164") => {
      tracing::debug!(phone = %identity.phone_e164, "phone already claimed, merging instead");
      let existing = find_applicant_in(conn, &identity.phone_e164, None)?.ok_or(e)?;
      Ok((merge(conn, existing, identity)?, false))
    }
    Err(e) => Err(e),
  }
}

fn next_request_sequence(conn: &Connection) -> Result<i64> {
  Ok(conn.query_row(
    "SELECT COALESCE(MAX(request_no), 0) + 1 FROM applicants WHERE request_no < ?1",
    [SEQUENCE_CEILING],
    |r| r.get(0),
  )?)
}

fn write_request_no(conn: &Connection, a: &mut Applicant, request_no: i64) -> Result<()> {
  let mut assigned = a.clone();
  assigned.assign_request_no(request_no);
  conn.execute(
    "UPDATE applicants SET request_no = ?2, request_code = ?3 WHERE applicant_id = ?1",
    rusqlite::params![encode_uuid(a.applicant_id), assigned.request_no, assigned.request_code],
  )?;
  *a = assigned;
  Ok(())
}

/// Give `a` its request number and code if it does not have them yet. Existing
/// identifiers are never changed.
fn ensure_request_identifiers(conn: &Connection, a: &mut Applicant) -> Result<()> {
  if let Some(request_no) = a.request_no {
    if a.request_code.is_none() {
      write_request_no(conn, a, request_no)?;
    }
    return Ok(());
  }

  let base = next_request_sequence(conn)?;
  for attempt in 0..MAX_SEQUENCE_ATTEMPTS as i64 {
    match write_request_no(conn, a, base + attempt) {
      Ok(()) => return Ok(()),
      Err(e)
        if e.is_unique_violation_on("applicants.request_no")
          || e.is_unique_violation_on("applicants.request_code") =>
      {
        tracing::warn!(applicant_id = %a.applicant_id, request_no = base + attempt, "request number taken, trying next");
      }
      Err(e) => return Err(e),
    }
  }

  let fallback = fallback_request_no(Utc::now());
  tracing::warn!(applicant_id = %a.applicant_id, fallback, "sequential request numbers exhausted, using fallback");
  write_request_no(conn, a, fallback)
}

fn insert_document(
  conn: &Connection,
  applicant_id: Uuid,
  kind: DocumentKind,
  url: String,
) -> Result<Document> {
  let document = Document {
    document_id: Uuid::new_v4(),
    applicant_id,
    kind,
    url,
    uploaded_at: Utc::now(),
  };
  conn.execute(
    "INSERT INTO documents (document_id, applicant_id, kind, url, uploaded_at)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    rusqlite::params![
      encode_uuid(document.document_id),
      encode_uuid(document.applicant_id),
      document.kind.as_ref(),
      document.url,
      encode_dt(document.uploaded_at),
    ],
  )?;
  Ok(document)
}

fn upsert_conversation_in(
  conn: &Connection,
  applicant_id: Uuid,
  remote_jid: String,
) -> Result<Conversation> {
  let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE remote_jid = ?1");
  let existing = conn
    .query_row(&sql, [&remote_jid], RawConversation::from_row)
    .optional()?
    .map(RawConversation::into_conversation)
    .transpose()?;

  match existing {
    Some(mut conv) => {
      conv.reset_for(applicant_id);
      conn.execute(
        "UPDATE conversations
            SET applicant_id = ?2, channel = ?3, state = ?4, updated_at = ?5
          WHERE conversation_id = ?1",
        rusqlite::params![
          encode_uuid(conv.conversation_id),
          encode_uuid(conv.applicant_id),
          conv.channel.as_ref(),
          conv.state.as_ref(),
          encode_dt(conv.updated_at),
        ],
      )?;
      Ok(conv)
    }
    None => {
      let conv = Conversation::registered(applicant_id, remote_jid);
      conn.execute(
        "INSERT INTO conversations (
           conversation_id, applicant_id, remote_jid, channel, state,
           last_message_id, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
          encode_uuid(conv.conversation_id),
          encode_uuid(conv.applicant_id),
          conv.remote_jid,
          conv.channel.as_ref(),
          conv.state.as_ref(),
          conv.last_message_id,
          encode_dt(conv.updated_at),
        ],
      )?;
      Ok(conv)
    }
  }
}

fn select_conversation(conn: &Connection, id: &str) -> Result<Option<Conversation>> {
  let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE conversation_id = ?1");
  conn
    .query_row(&sql, [id], RawConversation::from_row)
    .optional()?
    .map(RawConversation::into_conversation)
    .transpose()
}

fn register_in(conn: &mut Connection, registration: Registration) -> Result<RegistrationOutcome> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  let (mut applicant, created) =
    reconcile(&tx, registration.candidate_id, &registration.identity)?;
  ensure_request_identifiers(&tx, &mut applicant)?;

  let document = registration
    .document
    .map(|upload| insert_document(&tx, applicant.applicant_id, upload.kind, upload.url))
    .transpose()?;

  let conversation = upsert_conversation_in(
    &tx,
    applicant.applicant_id,
    remote_jid_for_phone(&registration.identity.phone_e164),
  )?;

  tx.commit()?;
  Ok(RegistrationOutcome { applicant, created, conversation, document })
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  for c in text.chars() {
    if matches!(c, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out
}

// ─── IntakeStore impl ────────────────────────────────────────────────────────

impl IntakeStore for SqliteStore {
  type Error = Error;

  // ── Applicants ────────────────────────────────────────────────────────────

  async fn find_applicant(
    &self,
    phone_e164: &str,
    document: Option<(DocType, &str)>,
  ) -> Result<Option<Applicant>> {
    let phone    = phone_e164.to_owned();
    let document = document.map(|(t, n)| (t, n.to_owned()));

    self
      .with_conn(move |conn| {
        find_applicant_in(conn, &phone, document.as_ref().map(|(t, n)| (*t, n.as_str())))
      })
      .await
  }

  async fn register(&self, registration: Registration) -> Result<RegistrationOutcome> {
    let outcome = self
      .with_conn(move |conn| register_in(conn, registration))
      .await?;

    tracing::info!(
      applicant_id = %outcome.applicant.applicant_id,
      request_code = outcome.applicant.request_code.as_deref().unwrap_or_default(),
      created = outcome.created,
      "applicant registered"
    );
    Ok(outcome)
  }

  async fn get_applicant(&self, id: Uuid) -> Result<Option<Applicant>> {
    let id_str = encode_uuid(id);
    self
      .with_conn(move |conn| select_applicant(conn, "applicant_id = ?1", [id_str]))
      .await
  }

  async fn get_applicant_detail(&self, id: Uuid) -> Result<Option<ApplicantDetail>> {
    let id_str = encode_uuid(id);

    self
      .with_conn(move |conn| {
        let applicant = match select_applicant(conn, "applicant_id = ?1", [&id_str])? {
          Some(a) => a,
          None    => return Ok(None),
        };

        let mut stmt = conn.prepare(&format!(
          "SELECT {DOCUMENT_COLUMNS} FROM documents
            WHERE applicant_id = ?1 ORDER BY uploaded_at DESC, rowid DESC"
        ))?;
        let documents = stmt
          .query_map([&id_str], RawDocument::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?
          .into_iter()
          .map(RawDocument::into_document)
          .collect::<Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(&format!(
          "SELECT {CONVERSATION_COLUMNS} FROM conversations
            WHERE applicant_id = ?1 ORDER BY updated_at DESC"
        ))?;
        let conversations = stmt
          .query_map([&id_str], RawConversation::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?
          .into_iter()
          .map(RawConversation::into_conversation)
          .collect::<Result<Vec<_>>>()?;

        Ok(Some(ApplicantDetail { applicant, documents, conversations }))
      })
      .await
  }

  async fn list_applicants(&self, query: &ApplicantQuery) -> Result<ApplicantPage> {
    let text = query
      .text
      .as_deref()
      .map(str::trim)
      .filter(|t| !t.is_empty())
      .map(str::to_owned);
    let page      = query.page.max(1);
    let page_size = query.page_size.max(1);

    let (rows, total) = self
      .with_conn(move |conn| {
        let pattern = text
          .as_deref()
          .map(|t| format!("%{}%", escape_like(&fold_case(t))));
        let number  = text.as_deref().and_then(|t| t.parse::<i64>().ok());

        let filter = format!(
          "(?1 IS NULL
            OR {FOLD_FN}(first_name)   LIKE ?1 ESCAPE '\\'
            OR {FOLD_FN}(last_name)    LIKE ?1 ESCAPE '\\'
            OR phone_e164              LIKE ?1 ESCAPE '\\'
            OR {FOLD_FN}(doc_number)   LIKE ?1 ESCAPE '\\'
            OR {FOLD_FN}(request_code) LIKE ?1 ESCAPE '\\'
            OR request_no = ?2)"
        );

        let total: i64 = conn.query_row(
          &format!("SELECT COUNT(*) FROM applicants WHERE {filter}"),
          rusqlite::params![pattern, number],
          |r| r.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
          "SELECT {APPLICANT_COLUMNS},
                  (SELECT COUNT(*) FROM documents d
                    WHERE d.applicant_id = applicants.applicant_id)
             FROM applicants
            WHERE {filter}
            ORDER BY created_at DESC, request_no DESC
            LIMIT ?3 OFFSET ?4"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![
              pattern,
              number,
              page_size as i64,
              ((page - 1) * page_size) as i64,
            ],
            |row| Ok((RawApplicant::from_row(row)?, row.get::<_, i64>(10)?)),
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((rows, total))
      })
      .await?;

    let items = rows
      .into_iter()
      .map(|(raw, count)| {
        Ok(ApplicantSummary {
          applicant:      raw.into_applicant()?,
          document_count: count.max(0) as u64,
        })
      })
      .collect::<Result<Vec<_>>>()?;

    let total = total.max(0) as u64;
    Ok(ApplicantPage {
      items,
      total,
      page,
      total_pages: (total as usize).div_ceil(page_size).max(1),
    })
  }

  // ── Documents ─────────────────────────────────────────────────────────────

  async fn add_document(&self, input: NewDocument) -> Result<Option<Document>> {
    let document = self
      .with_conn(move |conn| {
        let tx = conn.transaction()?;
        if !applicant_exists(&tx, input.applicant_id)? {
          return Ok(None);
        }
        let document = insert_document(&tx, input.applicant_id, input.kind, input.url)?;
        tx.commit()?;
        Ok(Some(document))
      })
      .await?;

    if let Some(d) = &document {
      tracing::info!(document_id = %d.document_id, applicant_id = %d.applicant_id, kind = d.kind.as_ref(), "document recorded");
    }
    Ok(document)
  }

  async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
    let id_str = encode_uuid(id);
    self
      .with_conn(move |conn| {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE document_id = ?1");
        conn
          .query_row(&sql, [id_str], RawDocument::from_row)
          .optional()?
          .map(RawDocument::into_document)
          .transpose()
      })
      .await
  }

  // ── Conversations ─────────────────────────────────────────────────────────

  async fn upsert_conversation(
    &self,
    applicant_id: Uuid,
    remote_jid: String,
  ) -> Result<Option<Conversation>> {
    self
      .with_conn(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !applicant_exists(&tx, applicant_id)? {
          return Ok(None);
        }
        let conversation = upsert_conversation_in(&tx, applicant_id, remote_jid)?;
        tx.commit()?;
        Ok(Some(conversation))
      })
      .await
  }

  async fn update_conversation_state(
    &self,
    conversation_id: Uuid,
    state: ConversationState,
    last_message_id: Option<String>,
  ) -> Result<Option<Conversation>> {
    let id_str = encode_uuid(conversation_id);
    let now    = encode_dt(Utc::now());

    self
      .with_conn(move |conn| {
        let changed = conn.execute(
          "UPDATE conversations
              SET state = ?2,
                  last_message_id = COALESCE(?3, last_message_id),
                  updated_at = ?4
            WHERE conversation_id = ?1",
          rusqlite::params![id_str, state.as_ref(), last_message_id, now],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        select_conversation(conn, &id_str)
      })
      .await
  }

  // ── Statistics ────────────────────────────────────────────────────────────

  async fn daily_registrations(&self, since: DateTime<Utc>) -> Result<Vec<DailyCount>> {
    let since_str = encode_dt(since);

    let rows: Vec<(String, i64)> = self
      .with_conn(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT substr(created_at, 1, 10) AS day, COUNT(*)
             FROM applicants
            WHERE created_at >= ?1
            GROUP BY day
            ORDER BY day",
        )?;
        let rows = stmt
          .query_map([since_str], |r| Ok((r.get(0)?, r.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .iter()
      .map(|(day, count)| decode_daily_count(day, *count))
      .collect()
  }

  async fn activity_totals(&self, since: DateTime<Utc>) -> Result<ActivityTotals> {
    let since_str = encode_dt(since);

    self
      .with_conn(move |conn| {
        let count = |sql: &str| -> Result<u64> {
          let n: i64 = conn.query_row(sql, [&since_str], |r| r.get(0))?;
          Ok(n.max(0) as u64)
        };
        Ok(ActivityTotals {
          applicants:    count("SELECT COUNT(*) FROM applicants WHERE created_at >= ?1")?,
          documents:     count("SELECT COUNT(*) FROM documents WHERE uploaded_at >= ?1")?,
          conversations: count("SELECT COUNT(*) FROM conversations WHERE updated_at >= ?1")?,
        })
      })
      .await
  }
}
