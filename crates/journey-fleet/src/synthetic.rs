//! Synthetic visitors for generated load.

use journey_protocol::{CustomerProfile, JourneyContext};
use rand::Rng;
use rand::seq::SliceRandom;

pub const CUSTOMER_NAMES: [&str; 16] = [
    "Sarah Johnson",
    "Michael Chen",
    "Emma Rodriguez",
    "David Kim",
    "Ashley Thompson",
    "Robert Martinez",
    "Jennifer Lee",
    "Christopher Brown",
    "Amanda Wilson",
    "Joshua Garcia",
    "Melissa Davis",
    "Andrew Miller",
    "Jessica Anderson",
    "Kevin Taylor",
    "Lauren Thomas",
    "Brian Jackson",
];

pub const SEGMENTS: [&str; 6] = ["Premium", "Standard", "Budget", "Enterprise", "SMB", "Startup"];

pub const TRAFFIC_SOURCES: [&str; 8] = [
    "Google_Ads",
    "Facebook_Campaign",
    "Email_Newsletter",
    "Direct_Traffic",
    "Referral_Partner",
    "Organic_Search",
    "Social_Media",
    "Content_Marketing",
];

pub const PRIORITIES: [&str; 4] = ["low", "normal", "high", "critical"];

fn email_for(name: &str) -> String {
    format!("{}@email.com", name.to_lowercase().replace(' ', "."))
}

/// Context for one generated visit. Ids follow `customer_<iteration>_<n>`,
/// `session_<company>_<iteration>`, and `trace_<correlationId>`.
pub fn visit_context<R: Rng + ?Sized>(
    rng: &mut R,
    company: &str,
    iteration: u64,
    correlation_id: &str,
    load_test_id: &str,
) -> JourneyContext {
    let name = CUSTOMER_NAMES.choose(rng).copied().unwrap_or(CUSTOMER_NAMES[0]);
    let segment = SEGMENTS.choose(rng).copied().unwrap_or(SEGMENTS[0]);
    let traffic = TRAFFIC_SOURCES
        .choose(rng)
        .copied()
        .unwrap_or(TRAFFIC_SOURCES[0]);
    let priority = PRIORITIES.choose(rng).copied().unwrap_or(PRIORITIES[1]);
    let customer_id = format!("customer_{iteration}_{}", rng.gen_range(0..10_000));
    let company_slug: String = company
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();

    JourneyContext {
        customer_profile: Some(CustomerProfile {
            name: name.to_string(),
            email: email_for(name),
            segment: segment.to_string(),
            user_id: customer_id.clone(),
            device_type: "desktop".into(),
            location: "US-East".into(),
        }),
        customer_id: Some(customer_id),
        session_id: Some(format!("session_{company_slug}_{iteration}")),
        trace_id: Some(format!("trace_{correlation_id}")),
        traffic_source: Some(traffic.to_string()),
        priority: Some(priority.to_string()),
        test_iteration: Some(iteration),
        load_test_id: Some(load_test_id.to_string()),
    }
}
