use std::sync::LazyLock;

use log::debug;
use regex::Regex;

static NOT_IN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bNOT\s+IN\s*\(").unwrap());
static NOT_EXISTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bNOT\s+EXISTS\s*\(").unwrap());

/// Marks anti-join candidates in raw SQL text.
///
/// `NOT IN (` gets a `/*ANTI_IN*/` prefix and `NOT EXISTS (` a `/*ANTI_EXISTS*/` prefix. Only
/// comments are added, so the parsed query is the same.
pub fn tag_anti_joins(sql: &str) -> String {
    let tagged = NOT_IN.replace_all(sql, "/*ANTI_IN*/ $0");
    let tagged = NOT_EXISTS.replace_all(&tagged, "/*ANTI_EXISTS*/ $0");

    if tagged != sql {
        debug!("Tagged anti-joins: {tagged}");
    }
    tagged.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::sql_parser::LogicalPlan;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tags_both_forms() {
        assert_eq!(
            tag_anti_joins("SELECT a.x FROM A a WHERE a.id NOT IN (SELECT b.aid FROM B b)"),
            "SELECT a.x FROM A a WHERE a.id /*ANTI_IN*/ NOT IN (SELECT b.aid FROM B b)"
        );
        assert_eq!(
            tag_anti_joins("SELECT a.x FROM A a WHERE not   exists(SELECT 1 FROM B b)"),
            "SELECT a.x FROM A a WHERE /*ANTI_EXISTS*/ not   exists(SELECT 1 FROM B b)"
        );
    }

    #[test]
    fn test_other_text_untouched() {
        for sql in [
            "SELECT a.x FROM A a WHERE a.id IN (1, 2)",
            "SELECT a.x FROM A a WHERE EXISTS (SELECT 1 FROM B b)",
            "SELECT a.nothing FROM A a WHERE a.notin = 1",
        ] {
            assert_eq!(tag_anti_joins(sql), sql);
        }
    }

    #[test]
    fn test_tagged_text_still_parses() {
        let sql = "SELECT a.x FROM A a WHERE a.id NOT IN (SELECT b.aid FROM B b)";

        assert_eq!(
            LogicalPlan::try_from(tag_anti_joins(sql).as_str()),
            LogicalPlan::try_from(sql)
        );
    }
}
