//! Policy SQL generation.
//!
//! A path `comments.post_id -> posts.author_id -> authors.tenant_id -> tenants.id`
//! becomes a nested predicate:
//!
//! ```sql
//! CREATE POLICY comments_rls_policy_1a2b3c ON comments USING (
//!     post_id IN (
//!         SELECT id
//!         FROM posts
//!         WHERE author_id IN (
//!             SELECT id
//!             FROM authors
//!             WHERE tenant_id::text = current_setting('my.current_tenant')
//!         )
//!     )
//! );
//! ```
//!
//! The hash suffix is derived from the predicate body, so a changed path
//! produces a new policy name.

use sha2::{Digest, Sha256};

use crate::path_finder::Path;

/// Infix shared by every generated policy name.
pub const POLICY_NAME_INFIX: &str = "_rls_policy";

pub(crate) const HASH_LEN: usize = 6;

/// A generated policy for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDescriptor {
    pub table: String,
    /// Nested predicate placed inside `USING (...)`.
    pub predicate: String,
    pub hash: String,
    pub name: String,
    /// Role the policy applies to; all roles when absent.
    pub role: Option<String>,
}

impl PolicyDescriptor {
    /// `CREATE POLICY` statement for this policy.
    pub fn create_statement(&self) -> String {
        let mut sql = format!(
            "CREATE POLICY {} ON {}",
            quote_ident(&self.name),
            quote_ident(&self.table)
        );
        if let Some(role) = &self.role {
            sql.push_str(" TO ");
            sql.push_str(&quote_ident(role));
        }
        sql.push_str(" USING (\n");
        sql.push_str(&self.predicate);
        sql.push_str(");");
        sql
    }

    pub fn drop_statement(&self) -> String {
        drop_policy_statement(&self.name, &self.table)
    }
}

/// Builds policy descriptors from paths.
#[derive(Debug, Clone)]
pub struct PolicyQueryBuilder {
    root_table: String,
    session_variable: String,
    role: Option<String>,
}

impl PolicyQueryBuilder {
    pub fn new(root_table: impl Into<String>, session_variable: impl Into<String>) -> Self {
        Self {
            root_table: root_table.into(),
            session_variable: session_variable.into(),
            role: None,
        }
    }

    /// Restrict generated policies to a role.
    pub fn with_role(mut self, role: Option<String>) -> Self {
        self.role = role;
        self
    }

    /// Build the policy for `table` from its path to the root.
    pub fn build_query(&self, table: &str, path: &Path) -> PolicyDescriptor {
        let predicate = self.predicate(path);
        let hash = policy_hash(&predicate);
        PolicyDescriptor {
            table: table.to_string(),
            name: policy_name(table, &hash),
            predicate,
            hash,
            role: self.role.clone(),
        }
    }

    /// Nested predicate for a path; one line per clause, newline terminated.
    pub fn predicate(&self, path: &Path) -> String {
        let mut body = String::new();

        for (index, step) in path.steps().iter().enumerate() {
            let indent = " ".repeat((index + 1) * 4);
            body.push_str(&indent);
            if index != 0 {
                body.push_str("WHERE ");
            }

            let column = quote_ident(&step.local_column);
            if step.foreign_table == self.root_table {
                body.push_str(&format!(
                    "{column}::text = current_setting({})\n",
                    quote_literal(&self.session_variable)
                ));
                continue;
            }

            body.push_str(&format!("{column} IN (\n"));
            body.push_str(&format!(
                "{indent}    SELECT {}\n",
                quote_ident(&step.foreign_column)
            ));
            body.push_str(&format!(
                "{indent}    FROM {}\n",
                quote_ident(&step.foreign_table)
            ));
        }

        // The root comparison is not a subquery, so it has no closing paren.
        for depth in (1..path.len()).rev() {
            body.push_str(&" ".repeat(depth * 4));
            body.push_str(")\n");
        }

        body
    }
}

/// Short content hash used as a policy version suffix.
pub fn policy_hash(predicate: &str) -> String {
    let digest = Sha256::digest(predicate.as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(HASH_LEN);
    hash
}

/// `{table}_rls_policy_{hash}`.
pub fn policy_name(table: &str, hash: &str) -> String {
    format!("{table}{POLICY_NAME_INFIX}_{hash}")
}

pub fn drop_policy_statement(policy: &str, table: &str) -> String {
    format!("DROP POLICY {} ON {}", quote_ident(policy), quote_ident(table))
}

pub fn enable_rls_statement(table: &str) -> String {
    format!("ALTER TABLE {} ENABLE ROW LEVEL SECURITY", quote_ident(table))
}

pub fn force_rls_statement(table: &str) -> String {
    format!("ALTER TABLE {} FORCE ROW LEVEL SECURITY", quote_ident(table))
}

/// Quote an identifier unless it is a plain lowercase name.
pub fn quote_ident(ident: &str) -> String {
    let mut chars = ident.chars();
    let plain = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$');
    if plain {
        ident.to_string()
    } else {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path_finder::PathStep;
    use pretty_assertions::assert_eq;

    fn step(local: &str, table: &str, foreign: &str) -> PathStep {
        PathStep {
            local_column: local.to_string(),
            foreign_table: table.to_string(),
            foreign_column: foreign.to_string(),
            nullable: false,
        }
    }

    fn builder() -> PolicyQueryBuilder {
        PolicyQueryBuilder::new("tenants", "my.current_tenant")
    }

    #[test]
    fn test_direct_reference_to_root() {
        let path = Path::new(vec![step("tenant_id", "tenants", "id")]);
        let policy = builder().build_query("authors", &path);

        assert_eq!(
            policy.create_statement(),
            format!(
                "CREATE POLICY authors_rls_policy_{} ON authors USING (\n    tenant_id::text = current_setting('my.current_tenant')\n);",
                policy.hash
            )
        );
    }

    #[test]
    fn test_nested_predicate() {
        let path = Path::new(vec![
            step("post_id", "posts", "id"),
            step("author_id", "authors", "id"),
            step("tenant_id", "tenants", "id"),
        ]);

        let expected = "    post_id IN (
        SELECT id
        FROM posts
        WHERE author_id IN (
            SELECT id
            FROM authors
            WHERE tenant_id::text = current_setting('my.current_tenant')
        )
    )
";
        assert_eq!(builder().predicate(&path), expected);
    }

    #[test]
    fn test_role_clause() {
        let path = Path::new(vec![step("tenant_id", "tenants", "id")]);
        let policy = builder()
            .with_role(Some("tenant_user".to_string()))
            .build_query("authors", &path);
        assert!(
            policy
                .create_statement()
                .contains(" ON authors TO tenant_user USING (")
        );
    }

    #[test]
    fn test_hash_depends_on_body_only() {
        let path = Path::new(vec![step("tenant_id", "tenants", "id")]);
        let plain = builder().build_query("authors", &path);
        let with_role = builder()
            .with_role(Some("app".to_string()))
            .build_query("authors", &path);
        assert_eq!(plain.hash, with_role.hash);
        assert_eq!(plain.hash.len(), 6);

        let other = Path::new(vec![step("owner_id", "tenants", "id")]);
        assert_ne!(builder().build_query("authors", &other).hash, plain.hash);
    }

    #[test]
    fn test_identifier_quoting() {
        assert_eq!(quote_ident("posts"), "posts");
        assert_eq!(quote_ident("post_2"), "post_2");
        assert_eq!(quote_ident("Posts"), "\"Posts\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
        assert_eq!(quote_ident("2fa"), "\"2fa\"");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn test_session_variable_is_escaped() {
        let path = Path::new(vec![step("tenant_id", "tenants", "id")]);
        let predicate = PolicyQueryBuilder::new("tenants", "x');--").predicate(&path);
        assert!(predicate.contains("current_setting('x'');--')"));
    }
}
