//! Pre-authored SQL for a few well-known questions.
//!
//! Consulted only when generation fails. Matching is plain keyword
//! containment on the lower-cased question: a template matches when every
//! keyword of any one of its trigger phrases occurs, and the first matching
//! template in table order wins.
//!
//! Templates are trusted text but still go through the gate like anything
//! else; [`FallbackMatcher::audit`] checks them all against a gate up front.

use serde::Serialize;

use crate::gate::{CandidateQuery, SecurityGate};

/// One intent and the SQL that answers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackTemplate {
    pub name:     &'static str,
    /// Alternatives; each is a list of keywords that must all be present
    pub triggers: &'static [&'static [&'static str]],
    pub sql:      &'static str
}

impl FallbackTemplate {
    fn matches(&self, question: &str) -> bool {
        self.triggers
            .iter()
            .any(|keywords| keywords.iter().all(|k| question.contains(k)))
    }
}

/// Templates over the invoice analytics schema
pub const BUILTIN_TEMPLATES: &[FallbackTemplate] = &[
    FallbackTemplate {
        name:     "top vendors by spend",
        triggers: &[&["top", "vendor"], &["vendor", "spend"], &["biggest", "vendor"]],
        sql:      "SELECT v.id, v.name, SUM(i.total) AS total_spend, COUNT(i.id) AS invoice_count \
                   FROM vendors v JOIN invoices i ON i.vendor_id = v.id \
                   GROUP BY v.id, v.name ORDER BY total_spend DESC LIMIT 10"
    },
    FallbackTemplate {
        name:     "top customers by revenue",
        triggers: &[&["top", "customer"], &["customer", "revenue"], &["biggest", "customer"]],
        sql:      "SELECT c.id, c.name, SUM(i.total) AS total_revenue, COUNT(i.id) AS invoice_count \
                   FROM customers c JOIN invoices i ON i.customer_id = c.id \
                   GROUP BY c.id, c.name ORDER BY total_revenue DESC LIMIT 10"
    },
    FallbackTemplate {
        name:     "overdue invoices",
        triggers: &[&["overdue"], &["past", "due"]],
        sql:      "SELECT i.invoice_number, v.name AS vendor, i.due_date, i.total, i.status \
                   FROM invoices i JOIN vendors v ON v.id = i.vendor_id \
                   WHERE i.status <> 'paid' AND i.due_date < CURRENT_DATE \
                   ORDER BY i.due_date"
    },
    FallbackTemplate {
        name:     "unpaid invoices",
        triggers: &[&["unpaid"], &["outstanding", "invoice"], &["open", "balance"]],
        sql:      "SELECT i.invoice_number, i.issue_date, i.due_date, i.total, \
                   i.total - COALESCE(SUM(p.amount), 0) AS balance \
                   FROM invoices i LEFT JOIN payments p ON p.invoice_id = i.id \
                   GROUP BY i.id, i.invoice_number, i.issue_date, i.due_date, i.total \
                   HAVING COALESCE(SUM(p.amount), 0) < i.total ORDER BY i.due_date"
    },
    FallbackTemplate {
        name:     "spend by category",
        triggers: &[&["by category"], &["category", "spend"], &["per category"]],
        sql:      "SELECT c.name AS category, SUM(li.amount) AS total_amount, COUNT(li.id) AS line_count \
                   FROM line_items li JOIN categories c ON c.id = li.category_id \
                   GROUP BY c.name ORDER BY total_amount DESC"
    },
    FallbackTemplate {
        name:     "recent payments",
        triggers: &[&["recent", "payment"], &["latest", "payment"], &["last", "payment"]],
        sql:      "SELECT p.payment_date, p.amount, p.method, p.reference, i.invoice_number \
                   FROM payments p JOIN invoices i ON i.id = p.invoice_id \
                   ORDER BY p.payment_date DESC LIMIT 20"
    },
    FallbackTemplate {
        name:     "invoice status breakdown",
        triggers: &[&["invoice", "by status"], &["status", "breakdown"], &["invoice", "per status"]],
        sql:      "SELECT status, COUNT(*) AS invoice_count, SUM(total) AS total_amount \
                   FROM invoices GROUP BY status ORDER BY invoice_count DESC"
    }
];

/// Outcome of vetting one template.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateAudit {
    pub name:     &'static str,
    pub sql:      &'static str,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason:   Option<String>
}

/// First-match keyword matcher over a fixed template table.
#[derive(Debug, Clone)]
pub struct FallbackMatcher {
    templates: Vec<FallbackTemplate>
}

impl Default for FallbackMatcher {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FallbackMatcher {
    pub fn builtin() -> Self {
        Self::with_templates(BUILTIN_TEMPLATES.to_vec())
    }

    pub fn with_templates(templates: Vec<FallbackTemplate>) -> Self {
        Self {
            templates
        }
    }

    pub fn templates(&self) -> &[FallbackTemplate] {
        &self.templates
    }

    /// First template whose triggers all occur in the question
    pub fn find(&self, question: &str) -> Option<&FallbackTemplate> {
        let question = question.to_lowercase();
        self.templates.iter().find(|t| t.matches(&question))
    }

    /// The matching template as a fallback-tagged candidate
    pub fn candidate(&self, question: &str) -> Option<CandidateQuery> {
        self.find(question).map(|t| CandidateQuery::fallback(t.sql))
    }

    /// Vet every template against `gate`
    pub fn audit(&self, gate: &SecurityGate) -> Vec<TemplateAudit> {
        self.templates
            .iter()
            .map(|t| {
                let verdict = gate.vet_candidate(&CandidateQuery::fallback(t.sql));
                TemplateAudit {
                    name:     t.name,
                    sql:      t.sql,
                    accepted: verdict.is_accepted(),
                    reason:   verdict.rejection().map(ToString::to_string)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{gate::QuerySource, policy::TableAllowlist};

    #[test]
    fn test_top_vendors_matches_case_insensitively() {
        let matcher = FallbackMatcher::builtin();
        let template = matcher.find("Show me the TOP Vendors by spend").unwrap();
        assert_eq!(template.name, "top vendors by spend");
    }

    #[test]
    fn test_keywords_need_not_be_adjacent() {
        let matcher = FallbackMatcher::builtin();
        let template = matcher
            .find("how much did we spend with each vendor last year?")
            .unwrap();
        assert_eq!(template.name, "top vendors by spend");
    }

    #[test]
    fn test_no_match() {
        let matcher = FallbackMatcher::builtin();
        assert!(matcher.find("what's the weather in Lisbon").is_none());
        assert!(matcher.candidate("").is_none());
    }

    #[test]
    fn test_candidate_is_tagged_fallback() {
        let matcher = FallbackMatcher::builtin();
        let candidate = matcher.candidate("list overdue invoices").unwrap();
        assert_eq!(candidate.source(), QuerySource::Fallback);
        assert!(candidate.sql().contains("due_date < CURRENT_DATE"));
    }

    #[test]
    fn test_first_match_wins() {
        let matcher = FallbackMatcher::builtin();
        let template = matcher.find("top customers and top vendors").unwrap();
        assert_eq!(template.name, "top vendors by spend");
    }

    #[test]
    fn test_builtin_templates_pass_default_gate() {
        let gate = SecurityGate::new(TableAllowlist::default());
        let audit = FallbackMatcher::builtin().audit(&gate);
        assert_eq!(audit.len(), BUILTIN_TEMPLATES.len());
        for entry in audit {
            assert!(entry.accepted, "{}: {:?}", entry.name, entry.reason);
        }
    }

    #[test]
    fn test_builtin_templates_pass_strict_gate() {
        let gate = SecurityGate::new(TableAllowlist::default()).with_strict_parse(true);
        assert!(
            FallbackMatcher::builtin()
                .audit(&gate)
                .iter()
                .all(|entry| entry.accepted)
        );
    }

    #[test]
    fn test_audit_reports_narrow_allowlist() {
        let gate = SecurityGate::new(TableAllowlist::new(["invoices"]));
        let audit = FallbackMatcher::builtin().audit(&gate);
        let status = audit
            .iter()
            .find(|entry| entry.name == "invoice status breakdown")
            .unwrap();
        assert!(status.accepted);
        let vendors = audit.iter().find(|e| e.name == "top vendors by spend").unwrap();
        assert!(!vendors.accepted);
        assert!(vendors.reason.as_deref().unwrap().contains("vendors"));
    }
}
