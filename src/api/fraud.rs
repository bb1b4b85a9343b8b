//! Fraud alert endpoint

use crate::client::Client;
use crate::error::Result;
use crate::types::FraudAlert;

impl Client {
    /// Retrieve the current fraud alerts
    pub async fn fraud_alerts(&self) -> Result<Vec<FraudAlert>> {
        self.get_json("fraud/alerts").await
    }
}
