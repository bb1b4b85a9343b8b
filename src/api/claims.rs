//! Claims endpoints

use crate::client::Client;
use crate::error::Result;
use crate::types::{Claim, RecordId};

impl Client {
    /// Retrieve every claim
    ///
    /// This is the refresh call behind claim-update pushes: a `claim_updated` envelope
    /// says that something changed, this says what the claims look like now.
    ///
    /// # Example
    /// ```ignore
    /// let client = Client::local()?;
    /// for claim in client.claims().await? {
    ///     println!("{} {:?}", claim.id, claim.status);
    /// }
    /// ```
    pub async fn claims(&self) -> Result<Vec<Claim>> {
        self.get_json("claims").await
    }

    /// Retrieve a single claim
    pub async fn claim(&self, id: &RecordId) -> Result<Claim> {
        self.get_json(&format!("claims/{id}")).await
    }
}
