//! Business Service
//!
//! Pass-through `Biz` methods. Access control and observation happen in the
//! interceptor; these handlers only answer.

use tonic::{Request, Response, Status};

use super::proto::gateway::v1::{Nothing, biz_server::Biz};

/// gRPC business service.
#[derive(Debug, Clone, Copy, Default)]
pub struct BizService;

impl BizService {
    /// Create the business service.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn acknowledged() -> Response<Nothing> {
    Response::new(Nothing { dummy: true })
}

#[tonic::async_trait]
impl Biz for BizService {
    async fn check(&self, _request: Request<Nothing>) -> Result<Response<Nothing>, Status> {
        Ok(acknowledged())
    }

    async fn add(&self, _request: Request<Nothing>) -> Result<Response<Nothing>, Status> {
        Ok(acknowledged())
    }

    async fn test(&self, _request: Request<Nothing>) -> Result<Response<Nothing>, Status> {
        Ok(acknowledged())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_method_acknowledges() {
        let service = BizService::new();
        let check = service.check(Request::new(Nothing::default())).await.unwrap();
        let add = service.add(Request::new(Nothing::default())).await.unwrap();
        let test = service.test(Request::new(Nothing::default())).await.unwrap();

        for response in [check, add, test] {
            assert!(response.into_inner().dummy);
        }
    }
}
