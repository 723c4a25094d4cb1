/// 数据源表
pub const CREATE_DATA_SOURCE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS data_source (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    source_type TEXT NOT NULL,
    config TEXT NOT NULL,
    db_num INTEGER NOT NULL DEFAULT 0,
    table_num INTEGER NOT NULL DEFAULT 0,
    partition_num INTEGER NOT NULL DEFAULT 0,
    init_status TEXT NOT NULL DEFAULT 'NOT_STARTED',
    last_update_time DATETIME,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

/// 库表
pub const CREATE_DB_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS db (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    owner TEXT,
    description TEXT,
    location TEXT,
    size INTEGER,
    num_rows INTEGER,
    last_ddl_time DATETIME,
    status TEXT NOT NULL DEFAULT 'INIT',
    UNIQUE (source_id, name),
    FOREIGN KEY (source_id) REFERENCES data_source(id)
)
"#;

/// 表元数据
pub const CREATE_CATALOG_TABLE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS catalog_table (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL,
    db_id INTEGER NOT NULL,
    db_name TEXT NOT NULL,
    schema_name TEXT NOT NULL DEFAULT '',
    name TEXT NOT NULL,
    table_type TEXT,
    has_partitions INTEGER NOT NULL DEFAULT 0,
    table_schema TEXT NOT NULL DEFAULT '{}',
    owner TEXT,
    lifecycle INTEGER,
    size INTEGER,
    num_rows INTEGER,
    last_ddl_time DATETIME,
    status TEXT NOT NULL DEFAULT 'INIT',
    UNIQUE (source_id, db_name, schema_name, name),
    FOREIGN KEY (db_id) REFERENCES db(id)
)
"#;

/// 分区元数据
pub const CREATE_CATALOG_PARTITION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS catalog_partition (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL,
    db_id INTEGER NOT NULL,
    table_id INTEGER NOT NULL,
    db_name TEXT NOT NULL,
    schema_name TEXT NOT NULL DEFAULT '',
    table_name TEXT NOT NULL,
    value TEXT NOT NULL,
    size INTEGER,
    num_rows INTEGER,
    last_ddl_time DATETIME,
    status TEXT NOT NULL DEFAULT 'INIT',
    UNIQUE (table_id, value),
    FOREIGN KEY (table_id) REFERENCES catalog_table(id)
)
"#;

pub const CREATE_PARTITION_SOURCE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_partition_source ON catalog_partition (source_id)
"#;

/// 作业表，id 由进程内分配
pub const CREATE_JOB_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS job (
    id INTEGER PRIMARY KEY,
    description TEXT,
    source_id INTEGER NOT NULL,
    source_name TEXT NOT NULL,
    db_name TEXT NOT NULL,
    dst_db_name TEXT NOT NULL,
    job_type TEXT NOT NULL,
    task_type TEXT NOT NULL,
    config TEXT NOT NULL,
    stopped INTEGER NOT NULL DEFAULT 0,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

/// 任务表，id 由进程内分配
pub const CREATE_TASK_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS task (
    id INTEGER PRIMARY KEY,
    job_id INTEGER NOT NULL,
    source_id INTEGER NOT NULL,
    db_id INTEGER NOT NULL,
    table_id INTEGER NOT NULL,
    db_name TEXT NOT NULL,
    schema_name TEXT NOT NULL DEFAULT '',
    table_name TEXT NOT NULL,
    dst_db_name TEXT NOT NULL,
    dst_table_name TEXT NOT NULL,
    task_type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'init',
    running INTEGER NOT NULL DEFAULT 0,
    restart INTEGER NOT NULL DEFAULT 0,
    stopped INTEGER NOT NULL DEFAULT 0,
    start_time DATETIME,
    end_time DATETIME,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (job_id) REFERENCES job(id)
)
"#;

pub const CREATE_TASK_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_task_table ON task (table_id, status)
"#;

/// 任务和分区的关联表
pub const CREATE_TASK_PARTITION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS task_partition (
    job_id INTEGER NOT NULL,
    task_id INTEGER NOT NULL,
    partition_id INTEGER NOT NULL,
    PRIMARY KEY (task_id, partition_id),
    FOREIGN KEY (task_id) REFERENCES task(id)
)
"#;

pub const CREATE_TASK_PARTITION_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_task_partition_partition ON task_partition (partition_id)
"#;
