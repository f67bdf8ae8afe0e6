// crates/keploy-core/src/core/mod.rs
// ============================================================================
// Module: Keploy Core Types
// Description: Data model shared by capture, replay, and driver adapters.
// Purpose: Group mode, identifiers, codec, dependency, mock, and testcase types.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Pure data types with no I/O. Everything here is serializable so testcases
//! can cross the control-plane boundary and be exported to files.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod codec;
pub mod dependency;
pub mod identifiers;
pub mod mock;
pub mod mode;
pub mod testcase;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use codec::BinaryPayload;
pub use codec::CodecError;
pub use codec::DriverError;
pub use codec::Payload;
pub use codec::RecordedError;
pub use dependency::Dependency;
pub use dependency::DependencyKind;
pub use dependency::DependencyMeta;
pub use identifiers::AppId;
pub use identifiers::RunId;
pub use identifiers::TEST_ID_HEADER;
pub use identifiers::TestcaseId;
pub use mock::GenericMockSpec;
pub use mock::GrpcMockSpec;
pub use mock::HttpMockSpec;
pub use mock::MOCK_VERSION;
pub use mock::Mock;
pub use mock::MockSpec;
pub use mock::SqlMockSpec;
pub use mode::Mode;
pub use mode::ModeError;
pub use mode::ModeRegister;
pub use mode::get_mode;
pub use mode::set_mode;
pub use testcase::GrpcRequest;
pub use testcase::GrpcResponse;
pub use testcase::Headers;
pub use testcase::HttpRequest;
pub use testcase::HttpResponse;
pub use testcase::Testcase;
pub use testcase::TestcaseKind;
pub use time::Timestamp;
