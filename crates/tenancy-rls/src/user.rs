//! Statements for the role tenant connections log in as.

use crate::query::{quote_ident, quote_literal};

pub fn user_exists_query(username: &str) -> String {
    format!(
        "SELECT usename FROM pg_user WHERE usename = {}",
        quote_literal(username)
    )
}

pub fn create_user_statement(username: &str, password: &str) -> String {
    format!(
        "CREATE USER {} LOGIN PASSWORD {}",
        quote_ident(username),
        quote_literal(password)
    )
}

/// Grants on `schema`, run on every call so tables added since the user was
/// created are covered too.
pub fn grant_statements(username: &str, schema: &str) -> Vec<String> {
    let user = quote_ident(username);
    let schema = quote_ident(schema);
    vec![
        format!("GRANT USAGE, CREATE ON SCHEMA {schema} TO {user}"),
        format!("GRANT USAGE ON ALL SEQUENCES IN SCHEMA {schema} TO {user}"),
        format!("GRANT ALL ON ALL TABLES IN SCHEMA {schema} TO {user}"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_statements_quote_names_and_password() {
        assert_eq!(
            create_user_statement("Tenant User", "it's"),
            r#"CREATE USER "Tenant User" LOGIN PASSWORD 'it''s'"#
        );
        assert_eq!(
            user_exists_query("o'brien"),
            "SELECT usename FROM pg_user WHERE usename = 'o''brien'"
        );
        assert_eq!(
            grant_statements("tenant_user", "public"),
            vec![
                "GRANT USAGE, CREATE ON SCHEMA public TO tenant_user",
                "GRANT USAGE ON ALL SEQUENCES IN SCHEMA public TO tenant_user",
                "GRANT ALL ON ALL TABLES IN SCHEMA public TO tenant_user",
            ]
        );
    }
}
