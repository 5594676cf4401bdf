mod http_transport;
mod retry_policy;
mod upstream;

pub use http_transport::HttpTransport;
pub use upstream::UpstreamEndpoint;
