/// 库/表名的白名单 + 黑名单过滤
///
/// 白名单非空时只保留命中的名字，之后再去掉命中黑名单的。表名单的元素可以是
/// `db.table`、`*.table` 或者不带库名的 `table`，后两种匹配任意库下的同名表。
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    whitelist: Vec<String>,
    blacklist: Vec<String>,
}

impl NameFilter {
    pub fn new(whitelist: &[String], blacklist: &[String]) -> Self {
        Self {
            whitelist: normalize(whitelist),
            blacklist: normalize(blacklist),
        }
    }

    pub fn accepts_database(&self, db: &str) -> bool {
        if !self.whitelist.is_empty() && !self.whitelist.iter().any(|w| w == db) {
            return false;
        }
        !self.blacklist.iter().any(|b| b == db)
    }

    pub fn accepts_table(&self, db: &str, table: &str) -> bool {
        if !self.whitelist.is_empty() && !self.whitelist.iter().any(|w| table_matches(w, db, table)) {
            return false;
        }
        !self.blacklist.iter().any(|b| table_matches(b, db, table))
    }

    pub fn filter_databases(&self, names: Vec<String>) -> Vec<String> {
        names.into_iter().filter(|n| self.accepts_database(n)).collect()
    }

    pub fn filter_tables(&self, db: &str, names: Vec<String>) -> Vec<String> {
        names
            .into_iter()
            .filter(|n| self.accepts_table(db, n))
            .collect()
    }
}

fn normalize(list: &[String]) -> Vec<String> {
    list.iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn table_matches(pattern: &str, db: &str, table: &str) -> bool {
    match pattern.split_once('.') {
        Some(("*", t)) => t == table,
        Some((d, t)) => d == db && t == table,
        None => pattern == table,
    }
}
