//! Instructions and fields for the three agent roles

use super::{FieldSpec, Signature};
use crate::llm::AgentRole;

pub static GENERATE_SQL: Signature = Signature {
    role: AgentRole::Generate,
    instructions: r#"
You translate a natural-language request into one SQL query against the database described below.

- Use the exact table and column names from the database information. Never invent identifiers.
- Write syntax for the requested SQL dialect.
- When the information signals large tables, filter on indexed columns, avoid full scans and add LIMIT where it does not change the answer.
- Use joins, aggregations, subqueries or window functions when the request needs them.
- Return only the SQL statement, without explanations.
"#,
    inputs: &[
        FieldSpec {
            name: "user_query",
            description: "Natural-language description of the data the user wants.",
        },
        FieldSpec {
            name: "dataset_information",
            description: "Tables, columns, types, indexes, relationships and sample rows.",
        },
        FieldSpec {
            name: "sql_dialect",
            description: "The SQL dialect to generate (e.g. MySQL, PostgreSQL, SQLite, SQL Server).",
        },
    ],
    output: FieldSpec {
        name: "generated_sql",
        description: "the SQL statement only",
    },
    chain_of_thought: false,
};

pub static DIAGNOSE_ERROR: Signature = Signature {
    role: AgentRole::Diagnose,
    instructions: r#"
You diagnose a failed SQL query and write fix instructions for another agent that will rewrite it.

Classify the failure as one of:
1. Non-SQL request: the user's request is not about retrieving data. In that case answer with exactly: NOT ASKING FOR SQL
2. Missing or incorrect table/column name.
3. Syntax error.
4. Datatype mismatch.
5. Missing required clause (GROUP BY, HAVING, JOIN condition, ...).
6. Unsafe or injection-prone input.

For every other case write:
- Error diagnosis: the error type.
- Root cause: why it happened, naming the exact identifiers involved.
- Fix: numbered steps that resolve it, using identifiers from the database information.
- Verification: how to confirm the fix works.

An empty result set counts as a failure: explain which filter or join most likely removed the rows.
"#,
    inputs: &[
        FieldSpec {
            name: "error_message",
            description: "The error returned by the database engine.",
        },
        FieldSpec {
            name: "incorrect_sql",
            description: "The SQL query that failed.",
        },
        FieldSpec {
            name: "information",
            description: "The user's request and the database schema details.",
        },
    ],
    output: FieldSpec {
        name: "error_fix_reasoning",
        description: "the diagnosis and step-by-step fix instructions as plain text",
    },
    chain_of_thought: false,
};

pub static REPAIR_SQL: Signature = Signature {
    role: AgentRole::Repair,
    instructions: r#"
You rewrite a failed SQL query by following fix instructions written by a diagnosis agent.

- Apply every step of the instructions; change nothing else.
- Keep identifiers exactly as the instructions name them.
- Keep the statement valid for its SQL dialect and check that required clauses are present.
- Return one complete, corrected SQL statement.
"#,
    inputs: &[FieldSpec {
        name: "instruction",
        description: "Fix instructions detailing the error and the solution.",
    }],
    output: FieldSpec {
        name: "generated_sql",
        description: "the corrected SQL statement only",
    },
    chain_of_thought: true,
};
