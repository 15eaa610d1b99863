//! mDNS scanner facade and handle-keyed scanner operations.

use bridge_traits::NativeMdnsScanner;
use core_runtime::events::MdnsResult;
use core_runtime::{Handle, ResourceKind};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::adapter::Call;
use crate::context::BridgeContext;
use crate::error::Result;
use crate::forwarder::{Listener, ListenerId, ListenerList, Subscription};

pub struct ScannerEntry {
    client: Handle,
    subtype: String,
    native: Arc<dyn NativeMdnsScanner>,
    listeners: Arc<ListenerList<MdnsResult>>,
    subscription: Mutex<Option<Subscription>>,
}

impl ScannerEntry {
    pub(crate) fn new(client: Handle, subtype: String, native: Arc<dyn NativeMdnsScanner>) -> Self {
        Self {
            client,
            subtype,
            native,
            listeners: Arc::new(ListenerList::new()),
            subscription: Mutex::new(None),
        }
    }

    pub fn client(&self) -> Handle {
        self.client
    }

    /// Service subtype filter; empty matches every device.
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    fn lock_subscription(&self) -> MutexGuard<'_, Option<Subscription>> {
        self.subscription.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn unsubscribe(&self) {
        let subscription = self.lock_subscription().take();
        drop(subscription);
    }
}

fn call(handle: Handle, operation: &'static str) -> Call {
    Call::new(ResourceKind::MdnsScanner, handle, operation)
}

// ============================================================================
// Handle-keyed operations
// ============================================================================

impl BridgeContext {
    /// Start scanning. Results reach listeners until the scanner is stopped.
    pub async fn scanner_start(&self, handle: Handle) -> Result<()> {
        let entry = self.registry.scanners.resolve(handle)?;
        self.ensure_client(entry.client)?;

        {
            let mut subscription = entry.lock_subscription();
            if subscription.is_none() {
                *subscription = Some(self.forwarder.forward_mdns_results(
                    handle,
                    Arc::clone(&entry.native),
                    Arc::clone(&entry.listeners),
                ));
            }
        }

        let started = self
            .adapter
            .fallible(call(handle, "start"), None, || entry.native.start());
        if started.is_err() {
            entry.unsubscribe();
        } else {
            debug!(scanner = %handle, subtype = %entry.subtype, "Scanner started");
        }
        started
    }

    /// Stop scanning. No result is delivered once this returns; listeners are kept.
    pub async fn scanner_stop(&self, handle: Handle) -> Result<()> {
        let entry = self.registry.scanners.resolve(handle)?;
        entry.unsubscribe();
        if !self.registry.clients.contains(entry.client) {
            return Ok(());
        }
        self.adapter
            .fallible(call(handle, "stop"), None, || entry.native.stop())
    }

    pub async fn scanner_is_started(&self, handle: Handle) -> Result<bool> {
        let entry = self.registry.scanners.resolve(handle)?;
        Ok(self
            .adapter
            .value(call(handle, "is_started"), || entry.native.is_started()))
    }

    /// Register a host listener for discovery results. Past results are not replayed.
    pub async fn scanner_add_result_listener(
        &self,
        handle: Handle,
        listener: Listener<MdnsResult>,
    ) -> Result<ListenerId> {
        let entry = self.registry.scanners.resolve(handle)?;
        Ok(entry.listeners.add(listener))
    }

    /// Returns whether the listener was registered.
    pub async fn scanner_remove_result_listener(
        &self,
        handle: Handle,
        listener: ListenerId,
    ) -> Result<bool> {
        let entry = self.registry.scanners.resolve(handle)?;
        Ok(entry.listeners.remove(listener))
    }

    /// Stop the scanner, drop its listeners and remove its handle. Idempotent.
    pub async fn scanner_dispose(&self, handle: Handle) -> Result<()> {
        if let Some(entry) = self.registry.scanners.remove(handle) {
            entry.unsubscribe();
            entry.listeners.clear();
            if entry.native.is_started() {
                if let Err(e) = entry.native.stop() {
                    debug!(scanner = %handle, error = %e, "Stop on dispose failed");
                }
            }
            debug!(scanner = %handle, "Scanner disposed");
        }
        Ok(())
    }
}

// ============================================================================
// Facade
// ============================================================================

#[derive(Clone)]
pub struct MdnsScanner {
    context: Arc<BridgeContext>,
    handle: Handle,
}

impl MdnsScanner {
    pub fn attach(context: Arc<BridgeContext>, handle: Handle) -> Self {
        Self { context, handle }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub async fn start(&self) -> Result<()> {
        self.context.scanner_start(self.handle).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.context.scanner_stop(self.handle).await
    }

    pub async fn is_started(&self) -> Result<bool> {
        self.context.scanner_is_started(self.handle).await
    }

    pub async fn add_result_listener<F>(&self, listener: F) -> Result<ListenerId>
    where
        F: Fn(&MdnsResult) + Send + Sync + 'static,
    {
        self.context
            .scanner_add_result_listener(self.handle, Arc::new(listener))
            .await
    }

    pub async fn remove_result_listener(&self, listener: ListenerId) -> Result<bool> {
        self.context
            .scanner_remove_result_listener(self.handle, listener)
            .await
    }

    pub async fn dispose(&self) -> Result<()> {
        self.context.scanner_dispose(self.handle).await
    }
}

impl std::fmt::Debug for MdnsScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MdnsScanner")
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockClient, MockScanner, MockSdk};
    use crate::EdgeClient;
    use bridge_traits::{
        ErrorCode, ListenerToken, MdnsAction, MdnsResultCallback, NativeClient, NativeError,
        NativeMdnsResult, NativeSdk,
    };
    use core_runtime::config::BridgeConfig;
    use std::collections::BTreeMap;

    type ReceiverSlot = Arc<Mutex<Option<MdnsResultCallback>>>;

    async fn scanner_with(native: MockScanner) -> (EdgeClient, MdnsScanner) {
        let native: Arc<dyn NativeMdnsScanner> = Arc::new(native);
        let mut client = MockClient::new();
        client.expect_version().return_const("test".to_string());
        client.expect_close().return_const(());
        client
            .expect_create_mdns_scanner()
            .withf(|subtype| subtype == "heat-pump")
            .returning(move |_| Ok(Arc::clone(&native)));
        let client: Arc<dyn NativeClient> = Arc::new(client);

        let mut sdk = MockSdk::new();
        sdk.expect_create_client()
            .returning(move |_| Ok(Arc::clone(&client)));
        let sdk: Arc<dyn NativeSdk> = Arc::new(sdk);

        let context = BridgeContext::shared(&BridgeConfig::builder().sdk(sdk).build().unwrap());
        let client = EdgeClient::create(&context).await.unwrap();
        let scanner = client.create_mdns_scanner("heat-pump").await.unwrap();
        (client, scanner)
    }

    fn found(device_id: &str) -> NativeMdnsResult {
        NativeMdnsResult {
            action: MdnsAction::Add,
            device_id: device_id.to_string(),
            product_id: "pr-1".to_string(),
            service_instance_name: format!("{}._nabto._udp.local", device_id),
            txt_items: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_no_results_after_stop() {
        let slot: ReceiverSlot = Arc::new(Mutex::new(None));
        let captured = Arc::clone(&slot);

        let mut native = MockScanner::new();
        native
            .expect_add_result_receiver()
            .times(1)
            .returning(move |receiver| {
                *captured.lock().unwrap() = Some(receiver);
                ListenerToken(3)
            });
        native
            .expect_remove_result_receiver()
            .withf(|token| *token == ListenerToken(3))
            .times(1)
            .return_const(());
        native.expect_start().times(1).returning(|| Ok(()));
        native.expect_stop().times(1).returning(|| Ok(()));
        native.expect_is_started().return_const(false);

        let (_client, scanner) = scanner_with(native).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        scanner
            .add_result_listener(move |r: &MdnsResult| sink.lock().unwrap().push(r.device_id.clone()))
            .await
            .unwrap();

        scanner.start().await.unwrap();
        let receiver = slot.lock().unwrap().clone().unwrap();
        receiver(found("de-1"));

        scanner.stop().await.unwrap();
        receiver(found("de-2"));

        assert_eq!(*seen.lock().unwrap(), vec!["de-1".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_start_unsubscribes() {
        let mut native = MockScanner::new();
        native
            .expect_add_result_receiver()
            .returning(|_| ListenerToken(0));
        native
            .expect_remove_result_receiver()
            .times(1)
            .return_const(());
        native
            .expect_start()
            .returning(|| Err(NativeError::from_code(ErrorCode::STOPPED)));
        native.expect_is_started().return_const(false);

        let (_client, scanner) = scanner_with(native).await;
        let err = scanner.start().await.unwrap_err();
        assert_eq!(err.native_code(), Some(ErrorCode::STOPPED));
        assert!(!scanner.is_started().await.unwrap());
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent() {
        let mut native = MockScanner::new();
        native.expect_is_started().return_const(false);

        let (_client, scanner) = scanner_with(native).await;
        scanner.dispose().await.unwrap();
        scanner.dispose().await.unwrap();
        assert!(scanner.is_started().await.unwrap_err().is_invalid_handle());
    }
}
