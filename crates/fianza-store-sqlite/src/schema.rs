//! SQL schema for the Fianza SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS applicants (
    applicant_id  TEXT PRIMARY KEY,
    request_no    INTEGER UNIQUE,         -- NULL only until backfilled
    request_code  TEXT UNIQUE,            -- derived from request_no
    first_name    TEXT,
    last_name     TEXT,
    phone_e164    TEXT NOT NULL UNIQUE,   -- primary matching key
    doc_type      TEXT,                   -- 'national_id' | 'foreign_resident_id' | 'passport'
    doc_number    TEXT,
    role          TEXT,                   -- 'primary_tenant' | 'co_signer'
    created_at    TEXT NOT NULL
);

-- Documents are immutable: no UPDATE or DELETE is ever issued.
CREATE TABLE IF NOT EXISTS documents (
    document_id   TEXT PRIMARY KEY,
    applicant_id  TEXT NOT NULL REFERENCES applicants(applicant_id),
    kind          TEXT NOT NULL,
    url           TEXT NOT NULL,
    uploaded_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conversations (
    conversation_id TEXT PRIMARY KEY,
    applicant_id    TEXT NOT NULL REFERENCES applicants(applicant_id),
    remote_jid      TEXT NOT NULL UNIQUE,
    channel         TEXT NOT NULL DEFAULT 'web',
    state           TEXT NOT NULL DEFAULT 'awaiting_opt_in',
    last_message_id TEXT,
    updated_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS applicants_doc_idx       ON applicants(doc_type, doc_number);
CREATE INDEX IF NOT EXISTS applicants_created_idx   ON applicants(created_at);
CREATE INDEX IF NOT EXISTS documents_applicant_idx  ON documents(applicant_id);
CREATE INDEX IF NOT EXISTS conversations_applicant_idx ON conversations(applicant_id);

PRAGMA user_version = 1;
";
