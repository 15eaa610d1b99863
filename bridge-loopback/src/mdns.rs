//! Discovery scanner fed by [`LoopbackSdk::announce`](crate::LoopbackSdk::announce).

use bridge_traits::{
    ErrorCode, ListenerToken, MdnsResultCallback, NativeError, NativeMdnsResult, NativeMdnsScanner,
    NativeResult,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::device::MdnsAdvertisement;
use crate::sdk::SdkShared;

pub(crate) struct ScannerShared {
    subtype: String,
    started: AtomicBool,
    receivers: Mutex<Vec<(ListenerToken, MdnsResultCallback)>>,
}

impl ScannerShared {
    /// Returns true if the advertisement was delivered.
    pub(crate) fn deliver(&self, advertisement: &MdnsAdvertisement) -> bool {
        if !self.started.load(Ordering::Acquire) || !advertisement.matches(&self.subtype) {
            return false;
        }
        let receivers: Vec<MdnsResultCallback> = self
            .receivers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, receiver)| Arc::clone(receiver))
            .collect();

        let result = NativeMdnsResult {
            action: advertisement.action,
            device_id: advertisement.device_id.clone(),
            product_id: advertisement.product_id.clone(),
            service_instance_name: advertisement.service_instance_name.clone(),
            txt_items: advertisement.txt_items.clone(),
        };
        for receiver in receivers {
            receiver(result.clone());
        }
        true
    }
}

pub struct LoopbackMdnsScanner {
    sdk: Arc<SdkShared>,
    client_closed: Arc<AtomicBool>,
    shared: Arc<ScannerShared>,
}

impl LoopbackMdnsScanner {
    pub(crate) fn new(sdk: Arc<SdkShared>, client_closed: Arc<AtomicBool>, subtype: &str) -> Self {
        let shared = Arc::new(ScannerShared {
            subtype: subtype.to_string(),
            started: AtomicBool::new(false),
            receivers: Mutex::new(Vec::new()),
        });
        sdk.track_scanner(&shared);
        Self {
            sdk,
            client_closed,
            shared,
        }
    }
}

impl NativeMdnsScanner for LoopbackMdnsScanner {
    fn start(&self) -> NativeResult<()> {
        if self.client_closed.load(Ordering::Acquire) {
            return Err(NativeError::from_code(ErrorCode::STOPPED));
        }
        self.shared.started.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&self) -> NativeResult<()> {
        self.shared.started.store(false, Ordering::Release);
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::Acquire)
    }

    fn add_result_receiver(&self, receiver: MdnsResultCallback) -> ListenerToken {
        let token = self.sdk.next_token();
        self.shared
            .receivers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((token, receiver));
        token
    }

    fn remove_result_receiver(&self, token: ListenerToken) {
        self.shared
            .receivers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(t, _)| *t != token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LoopbackSdk;
    use bridge_traits::{ClientContext, MdnsAction, NativeSdk};

    #[tokio::test]
    async fn test_only_started_matching_scanners_receive() {
        let sdk = LoopbackSdk::current().unwrap();
        let client = sdk.create_client(&ClientContext::default()).unwrap();
        let all = client.create_mdns_scanner("").unwrap();
        let filtered = client.create_mdns_scanner("heatpump").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        all.add_result_receiver(Arc::new(move |r: NativeMdnsResult| {
            sink.lock().unwrap().push(r.device_id)
        }));

        let adv = MdnsAdvertisement::new("pr-1", "de-1").with_action(MdnsAction::Update);
        assert_eq!(sdk.announce(&adv), 0);

        all.start().unwrap();
        filtered.start().unwrap();
        assert_eq!(sdk.announce(&adv), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["de-1".to_string()]);

        all.stop().unwrap();
        assert!(!all.is_started());
        assert_eq!(sdk.announce(&adv.clone().with_subtype("heatpump")), 1);
    }
}
