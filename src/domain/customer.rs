//! Customer — only the slice the core touches: the first-time-customer
//! flag used by the tour-run aggregator.

use super::ids::{CustomerId, OrganizationId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Customer {
    pub id: CustomerId,
    pub organization_id: OrganizationId,
}
