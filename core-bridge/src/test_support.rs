//! mockall doubles of the native SDK traits for unit tests.

use bridge_traits::{
    ClientContext, Completion, ConnectionEventsCallback, ConnectionType, ErrorCode, ListenerToken,
    MdnsResultCallback, NativeClient, NativeCoap, NativeCoapResponse, NativeConnection,
    NativeMdnsScanner, NativeResult, NativeSdk, NativeStream, NativeTcpTunnel,
};
use mockall::mock;
use std::sync::Arc;

mock! {
    pub Sdk {}

    impl NativeSdk for Sdk {
        fn create_client(&self, context: &ClientContext) -> NativeResult<Arc<dyn NativeClient>>;
    }
}

mock! {
    pub Client {}

    impl NativeClient for Client {
        fn version(&self) -> String;
        fn set_log_level(&self, level: &str) -> NativeResult<()>;
        fn create_private_key(&self) -> NativeResult<String>;
        fn create_connection(&self) -> NativeResult<Arc<dyn NativeConnection>>;
        fn create_mdns_scanner(&self, subtype: &str) -> NativeResult<Arc<dyn NativeMdnsScanner>>;
        fn close(&self);
    }
}

mock! {
    pub Connection {}

    impl NativeConnection for Connection {
        fn update_options(&self, options_json: &str) -> NativeResult<()>;
        fn options(&self) -> NativeResult<String>;
        fn connect(&self, done: Completion<()>);
        fn password_authenticate(&self, username: &str, password: &str, done: Completion<()>);
        fn connection_close(&self, done: Completion<()>);
        fn close(&self);
        fn create_stream(&self) -> NativeResult<Arc<dyn NativeStream>>;
        fn create_coap(&self, method: &str, path: &str) -> NativeResult<Arc<dyn NativeCoap>>;
        fn create_tcp_tunnel(&self) -> NativeResult<Arc<dyn NativeTcpTunnel>>;
        fn device_fingerprint(&self) -> NativeResult<String>;
        fn client_fingerprint(&self) -> NativeResult<String>;
        fn connection_type(&self) -> NativeResult<ConnectionType>;
        fn add_connection_events_listener(&self, listener: ConnectionEventsCallback) -> ListenerToken;
        fn remove_connection_events_listener(&self, token: ListenerToken);
        fn enable_direct_candidates(&self) -> NativeResult<()>;
        fn add_direct_candidate(&self, host: &str, port: u16) -> NativeResult<()>;
        fn end_of_direct_candidates(&self) -> NativeResult<()>;
        fn local_channel_error_code(&self) -> NativeResult<ErrorCode>;
        fn remote_channel_error_code(&self) -> NativeResult<ErrorCode>;
        fn direct_candidates_channel_error_code(&self) -> NativeResult<ErrorCode>;
    }
}

mock! {
    pub Stream {}

    impl NativeStream for Stream {
        fn open(&self, stream_port: u32, done: Completion<()>);
        fn read_some(&self, done: Completion<Vec<u8>>);
        fn read_all(&self, length: usize, done: Completion<Vec<u8>>);
        fn write(&self, bytes: Vec<u8>, done: Completion<()>);
        fn stream_close(&self, done: Completion<()>);
        fn close(&self);
    }
}

mock! {
    pub Coap {}

    impl NativeCoap for Coap {
        fn set_request_payload(&self, content_format: u16, payload: Vec<u8>) -> NativeResult<()>;
        fn execute(&self, done: Completion<NativeCoapResponse>);
    }
}

mock! {
    pub Tunnel {}

    impl NativeTcpTunnel for Tunnel {
        fn open(&self, service: &str, local_port: u16) -> NativeResult<()>;
        fn local_port(&self) -> NativeResult<u16>;
        fn tunnel_close(&self, done: Completion<()>);
        fn close(&self);
    }
}

mock! {
    pub Scanner {}

    impl NativeMdnsScanner for Scanner {
        fn start(&self) -> NativeResult<()>;
        fn stop(&self) -> NativeResult<()>;
        fn is_started(&self) -> bool;
        fn add_result_receiver(&self, receiver: MdnsResultCallback) -> ListenerToken;
        fn remove_result_receiver(&self, token: ListenerToken);
    }
}
