use serde::Serialize;

/// Uniform `{"data": ...}` envelope for successful responses.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}
