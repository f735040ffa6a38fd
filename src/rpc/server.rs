use tonic::{Request, Response, Status};
use tracing::debug;

use super::pb::inventory_service_server::{InventoryService, InventoryServiceServer};
use super::pb::{CommitSeatRequest, CommitSeatResponse};
use crate::services::{CommitResult, CommitService};

/// Сервер `InventoryService`. Аутентификации нет: граница доверия - внутренняя сеть.
#[derive(Clone)]
pub struct InventoryGrpc {
    commits: CommitService,
}

impl InventoryGrpc {
    pub fn new(commits: CommitService) -> Self {
        Self { commits }
    }

    pub fn into_service(self) -> InventoryServiceServer<Self> {
        InventoryServiceServer::new(self)
    }
}

impl From<CommitResult> for CommitSeatResponse {
    fn from(result: CommitResult) -> Self {
        Self {
            success: result.success,
            message: result.message.unwrap_or_default(),
        }
    }
}

#[tonic::async_trait]
impl InventoryService for InventoryGrpc {
    async fn commit_seat(
        &self,
        request: Request<CommitSeatRequest>,
    ) -> Result<Response<CommitSeatResponse>, Status> {
        let seat_id = request.into_inner().seat_id;
        debug!(seat_id, "CommitSeat called");

        // бизнес-отказы и внутренние сбои возвращаются в теле ответа, а не статусом
        let result = self.commits.commit_seat(seat_id).await;
        Ok(Response::new(result.into()))
    }
}
