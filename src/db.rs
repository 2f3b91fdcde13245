use crate::ledger::FeeCategory;
use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "feedesk.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS admins(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            admission_no TEXT NOT NULL,
            year INTEGER NOT NULL,
            quota TEXT NOT NULL DEFAULT '',
            address TEXT NOT NULL DEFAULT '',
            academic_year TEXT NOT NULL,
            group_name TEXT NOT NULL,
            admin_id TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(admin_id) REFERENCES admins(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_admin_admission ON students(admin_id, admission_no)",
        [],
    )?;

    // Amounts are exact decimals kept as TEXT; one fixed/discount pair per category.
    let mut amount_columns = String::new();
    for c in FeeCategory::ALL {
        amount_columns.push_str(&format!(
            "{} TEXT NOT NULL DEFAULT '0',\n            {} TEXT NOT NULL DEFAULT '0',\n            ",
            c.fee_column(),
            c.discount_column()
        ));
    }
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS fee_schedules(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL UNIQUE,
            admin_id TEXT,
            {amount_columns}is_locked INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(admin_id) REFERENCES admins(id)
        )"
        ),
        [],
    )?;
    ensure_fee_schedules_is_locked(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fee_schedules_admin ON fee_schedules(admin_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payments(
            id TEXT PRIMARY KEY,
            fee_schedule_id TEXT NOT NULL,
            fee_type TEXT NOT NULL,
            paid_amount TEXT NOT NULL,
            bill_no TEXT NOT NULL,
            payment_date TEXT NOT NULL,
            student_name TEXT NOT NULL,
            admission_no TEXT NOT NULL,
            admin_name TEXT,
            admin_id TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(fee_schedule_id) REFERENCES fee_schedules(id),
            FOREIGN KEY(admin_id) REFERENCES admins(id)
        )",
        [],
    )?;
    ensure_payments_admin_name(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_fee_type ON payments(fee_schedule_id, fee_type)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_admin_bill ON payments(admin_id, bill_no)",
        [],
    )?;

    Ok(conn)
}

fn ensure_fee_schedules_is_locked(conn: &Connection) -> anyhow::Result<()> {
    // Workspaces created before locking existed: every schedule starts unlocked.
    if table_has_column(conn, "fee_schedules", "is_locked")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE fee_schedules ADD COLUMN is_locked INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

fn ensure_payments_admin_name(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "payments", "admin_name")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE payments ADD COLUMN admin_name TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
