//! Seed collections for the simulated CRM.

use serde_json::{json, Value};

use parley_core::{Record, ResourceKind};

pub fn seed_records(kind: ResourceKind) -> Vec<Record> {
    let rows = match kind {
        ResourceKind::Lead => leads(),
        ResourceKind::Task => tasks(),
        ResourceKind::Opportunity => opportunities(),
    };
    rows.into_iter().filter_map(|row| row.as_object().cloned()).collect()
}

fn leads() -> Vec<Value> {
    vec![
        json!({
            "name": "LEAD-00001",
            "lead_name": "John Smith",
            "company_name": "Acme Corporation",
            "status": "Open",
            "email": "john.smith@acme.com",
            "phone": "+1-555-123-4567",
            "creation": "2023-10-15T14:30:00",
            "source": "Website",
            "notes": "Interested in our premium plan",
        }),
        json!({
            "name": "LEAD-00002",
            "lead_name": "Sarah Johnson",
            "company_name": "TechCorp Inc.",
            "status": "Qualified",
            "email": "sarah.j@techcorp.com",
            "phone": "+1-555-987-6543",
            "creation": "2023-11-02T10:15:00",
            "source": "Referral",
            "notes": "CFO looking for enterprise solution",
        }),
        json!({
            "name": "LEAD-00003",
            "lead_name": "Michael Brown",
            "company_name": "Global Logistics",
            "status": "Open",
            "email": "m.brown@globallogistics.com",
            "phone": "+1-555-456-7890",
            "creation": "2023-11-10T09:45:00",
            "source": "Trade Show",
            "notes": "Needs a solution by Q1 2024",
        }),
        json!({
            "name": "LEAD-00004",
            "lead_name": "Emma Wilson",
            "company_name": "Retail Masters",
            "status": "Open",
            "email": "emma@retailmasters.com",
            "phone": "+1-555-234-5678",
            "creation": "2023-12-05T16:20:00",
            "source": "Website",
            "notes": "Requested product demo",
        }),
        json!({
            "name": "LEAD-00005",
            "lead_name": "David Lee",
            "company_name": "Innovate Solutions",
            "status": "Qualified",
            "email": "david.lee@innovate.io",
            "phone": "+1-555-876-5432",
            "creation": "2023-12-15T13:10:00",
            "source": "LinkedIn",
            "notes": "Technical director seeking automation tools",
        }),
    ]
}

fn tasks() -> Vec<Value> {
    vec![
        json!({
            "name": "TASK-00001",
            "subject": "Follow up with John Smith",
            "status": "Open",
            "priority": "Medium",
            "due_date": "2024-01-15",
            "assigned_to": "sales@example.com",
            "project": "Acme Corporation Deal",
            "reference_type": "Lead",
            "reference_name": "LEAD-00001",
        }),
        json!({
            "name": "TASK-00002",
            "subject": "Send proposal to TechCorp",
            "status": "Open",
            "priority": "High",
            "due_date": "2024-01-10",
            "assigned_to": "sales@example.com",
            "project": "TechCorp Expansion",
            "reference_type": "Opportunity",
            "reference_name": "OPTY-00002",
        }),
        json!({
            "name": "TASK-00003",
            "subject": "Schedule demo with Global Logistics",
            "status": "Completed",
            "priority": "Medium",
            "due_date": "2023-12-20",
            "assigned_to": "support@example.com",
            "project": "Global Logistics Implementation",
            "reference_type": "Lead",
            "reference_name": "LEAD-00003",
        }),
        json!({
            "name": "TASK-00004",
            "subject": "Prepare contract for Retail Masters",
            "status": "Open",
            "priority": "High",
            "due_date": "2024-01-20",
            "assigned_to": "legal@example.com",
            "project": "Retail Masters Deal",
            "reference_type": "Opportunity",
            "reference_name": "OPTY-00004",
        }),
        json!({
            "name": "TASK-00005",
            "subject": "Quarterly review with Innovate Solutions",
            "status": "Open",
            "priority": "Low",
            "due_date": "2024-01-30",
            "assigned_to": "account@example.com",
            "project": "Innovate Solutions Maintenance",
            "reference_type": "Customer",
            "reference_name": "CUST-00005",
        }),
    ]
}

fn opportunities() -> Vec<Value> {
    vec![
        json!({
            "name": "OPTY-00001",
            "opportunity_from": "Lead",
            "party_name": "LEAD-00001",
            "customer_name": "Acme Corporation",
            "opportunity_amount": 25000,
            "status": "Open",
            "expected_closing": "2024-02-15",
            "probability": 70,
            "currency": "USD",
            "sales_stage": "Negotiation",
        }),
        json!({
            "name": "OPTY-00002",
            "opportunity_from": "Lead",
            "party_name": "LEAD-00002",
            "customer_name": "TechCorp Inc.",
            "opportunity_amount": 75000,
            "status": "Open",
            "expected_closing": "2024-03-10",
            "probability": 60,
            "currency": "USD",
            "sales_stage": "Needs Analysis",
        }),
        json!({
            "name": "OPTY-00003",
            "opportunity_from": "Lead",
            "party_name": "LEAD-00003",
            "customer_name": "Global Logistics",
            "opportunity_amount": 42000,
            "status": "Open",
            "expected_closing": "2024-02-28",
            "probability": 50,
            "currency": "USD",
            "sales_stage": "Qualification",
        }),
        json!({
            "name": "OPTY-00004",
            "opportunity_from": "Lead",
            "party_name": "LEAD-00004",
            "customer_name": "Retail Masters",
            "opportunity_amount": 30000,
            "status": "Closed",
            "expected_closing": "2023-12-30",
            "probability": 100,
            "currency": "USD",
            "sales_stage": "Closed Won",
        }),
        json!({
            "name": "OPTY-00005",
            "opportunity_from": "Lead",
            "party_name": "LEAD-00005",
            "customer_name": "Innovate Solutions",
            "opportunity_amount": 18000,
            "status": "Open",
            "expected_closing": "2024-04-15",
            "probability": 40,
            "currency": "USD",
            "sales_stage": "Proposition",
        }),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use parley_core::ResourceKind;

    use super::seed_records;

    #[test]
    fn every_kind_seeds_five_uniquely_named_records_with_its_prefix() {
        for kind in ResourceKind::ALL {
            let records = seed_records(kind);
            let names: HashSet<&str> = records
                .iter()
                .filter_map(|record| record.get("name").and_then(|name| name.as_str()))
                .collect();

            assert_eq!(records.len(), 5, "{kind} seed size");
            assert_eq!(names.len(), 5, "{kind} names should be unique");
            assert!(names.iter().all(|name| name.starts_with(kind.id_prefix())));
        }
    }
}
