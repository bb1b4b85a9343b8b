//! Dashboard statistics endpoint

use crate::client::Client;
use crate::error::Result;
use crate::types::DashboardStats;

impl Client {
    /// Retrieve the current dashboard statistics
    pub async fn dashboard_stats(&self) -> Result<DashboardStats> {
        self.get_json("dashboard/stats").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use mockito::Server;

    #[tokio::test]
    async fn test_dashboard_stats() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/dashboard/stats")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "total_claims": 120,
                    "pending_claims": 30,
                    "approved_claims": 70,
                    "rejected_claims": 20,
                    "active_fraud_alerts": 4,
                    "total_amount": 98765.5,
                    "average_processing_days": 3.2
                }"#,
            )
            .create_async()
            .await;

        let client = Client::new(format!("{}/api", server.url())).unwrap();
        let stats = client.dashboard_stats().await.unwrap();

        assert_eq!(stats.total_claims, 120);
        assert_eq!(stats.pending_claims, 30);
        assert_eq!(stats.active_fraud_alerts, 4);
        assert_eq!(stats.total_amount, 98765.5);
        assert!(stats.extra.contains_key("average_processing_days"));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_dashboard_stats_error_field() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/dashboard/stats")
            .with_status(503)
            .with_body(r#"{"error": "stats unavailable"}"#)
            .create_async()
            .await;

        let client = Client::new(format!("{}/api", server.url())).unwrap();
        let err = client.dashboard_stats().await.unwrap_err();
        assert_eq!(err.to_string(), "API error: stats unavailable");
        assert!(matches!(err, Error::Api(_)));

        mock.assert_async().await;
    }
}
