//! UploadOrchestrator - アップロード → 変換 → 保存 → 登録のパイプライン
//!
//! # フロー（各ステップは順番に await する。並列化しない）
//! 1. 入力検証（ここで失敗すればストレージにもコーデックにも触らない）
//! 2. job id を生成
//! 3. 元の HEIC を保存 → original CID
//! 4. PNG に変換
//! 5. PNG を保存 → processed CID
//! 6. 完成した JobRecord を registry に登録
//! 7. 両方の取得用 URL を返す
//!
//! 途中で失敗した場合、保存済みのオブジェクトはロールバックしない（孤児になる）。
//! registry への書き込みは 6 だけなので、失敗した試行のエントリは残らない。

use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, warn};

use super::registry::JobRegistry;
use crate::domain::{JobId, JobRecord, PipelineError, ProcessedView, UploadReceipt, UploadRequest};
use crate::ports::{IdGenerator, ImageConverter};
use crate::storage::StorageGateway;

/// UploadOrchestrator はリクエストごとのパイプラインを駆動する
///
/// 共有状態（gateway / registry）は `Arc` で注入される。
/// 複数のアップロードは互いに独立して同時に走ってよい。
pub struct UploadOrchestrator {
    gateway: Arc<StorageGateway>,
    converter: Arc<dyn ImageConverter>,
    registry: Arc<JobRegistry>,
    id_gen: Arc<dyn IdGenerator>,
    max_upload_bytes: usize,
}

impl UploadOrchestrator {
    pub fn new(
        gateway: Arc<StorageGateway>,
        converter: Arc<dyn ImageConverter>,
        registry: Arc<JobRegistry>,
        id_gen: Arc<dyn IdGenerator>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            gateway,
            converter,
            registry,
            id_gen,
            max_upload_bytes,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn gateway(&self) -> &Arc<StorageGateway> {
        &self.gateway
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// アップロード 1 件を処理する
    pub async fn handle_upload(&self, request: UploadRequest) -> Result<UploadReceipt, PipelineError> {
        request.validate(self.max_upload_bytes)?;

        let job_id = self.id_gen.generate_job_id();
        let bucket = self.gateway.bucket_id();
        info!(job_id = %job_id, file_name = %request.file_name, size = request.bytes.len(), "processing upload");

        let original = self
            .gateway
            .upload_object(request.bytes.clone(), bucket)
            .await
            .inspect_err(|e| warn!(job_id = %job_id, error = %e, "failed to store original"))?;
        info!(job_id = %job_id, cid = %original.cid, "original stored");

        let png = self.converter.convert(request.bytes).await.inspect_err(|e| {
            warn!(job_id = %job_id, orphaned_cid = %original.cid, error = %e, "conversion failed")
        })?;

        let processed = self
            .gateway
            .upload_object(png, bucket)
            .await
            .inspect_err(|e| {
                warn!(job_id = %job_id, orphaned_cid = %original.cid, error = %e, "failed to store converted image")
            })?;
        info!(job_id = %job_id, cid = %processed.cid, "converted image stored");

        let record = self.registry.put(job_id, original.cid, processed.cid);

        let receipt = UploadReceipt {
            id: job_id,
            original_url: self.gateway.url_for_object(bucket, &record.original_cid),
            processed_url: self.gateway.url_for_object(bucket, &record.processed_cid),
        };
        info!(job_id = %job_id, processed_url = %receipt.processed_url, "conversion successful");
        Ok(receipt)
    }

    /// 変換済み画像の URL と CID を返す（I/O なし）
    pub fn processed(&self, id: &str) -> Result<ProcessedView, PipelineError> {
        let record = self.lookup(id)?;
        Ok(ProcessedView {
            url: self
                .gateway
                .url_for_object(self.gateway.bucket_id(), &record.processed_cid),
            cid: record.processed_cid,
        })
    }

    /// 変換済み画像のバイト列をストレージから取得する
    pub async fn download(&self, id: &str) -> Result<Bytes, PipelineError> {
        let record = self.lookup(id)?;
        let bytes = self
            .gateway
            .read_object(&record.processed_cid, self.gateway.bucket_id())
            .await?;
        Ok(bytes)
    }

    fn lookup(&self, id: &str) -> Result<JobRecord, PipelineError> {
        let job_id: JobId = id
            .parse()
            .map_err(|_| PipelineError::JobNotFound(id.to_string()))?;
        self.registry
            .get(&job_id)
            .ok_or_else(|| PipelineError::JobNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{ScryptParams, Signer, WalletCredentials};
    use crate::domain::format::ftyp_box;
    use crate::domain::{
        BucketId, ConversionError, ErrorKind, StorageError, ValidationError, is_png,
    };
    use crate::impls::{InMemoryConnector, InMemoryObjectStore};
    use crate::ports::{StorageConnector, SystemClock, UlidGenerator};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BUCKET: BucketId = BucketId::new(1086);
    const GATEWAY_URL: &str = "https://cdn.example.net";

    /// 呼び出し回数を数え、固定の PNG を返す（`fail` なら失敗する）
    struct ScriptedConverter {
        calls: AtomicUsize,
        fail: Option<ConversionError>,
    }

    impl ScriptedConverter {
        fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: None,
            }
        }

        fn failing(err: ConversionError) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: Some(err),
            }
        }
    }

    #[async_trait]
    impl ImageConverter for ScriptedConverter {
        async fn convert(&self, heic: Bytes) -> Result<Bytes, ConversionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = &self.fail {
                return Err(err.clone());
            }
            crate::domain::sniff_heic(&heic)?;
            let mut png = crate::domain::format::PNG_SIGNATURE.to_vec();
            png.extend_from_slice(&heic);
            Ok(Bytes::from(png))
        }
    }

    struct Fixture {
        orchestrator: UploadOrchestrator,
        store: Arc<InMemoryObjectStore>,
        connector: Arc<InMemoryConnector>,
        converter: Arc<ScriptedConverter>,
    }

    fn fixture_with(store: InMemoryObjectStore, converter: ScriptedConverter) -> Fixture {
        let store = Arc::new(store);
        let connector = Arc::new(InMemoryConnector::new(store.clone()));
        let converter = Arc::new(converter);
        let wallet = WalletCredentials::encrypt(
            &Signer::generate(),
            "pw",
            ScryptParams {
                log_n: 4,
                r: 8,
                p: 1,
            },
        )
        .unwrap();
        let gateway = Arc::new(StorageGateway::new(
            connector.clone() as Arc<dyn StorageConnector>,
            wallet,
            "pw",
            BUCKET,
            GATEWAY_URL,
        ));
        let orchestrator = UploadOrchestrator::new(
            gateway,
            converter.clone(),
            Arc::new(JobRegistry::new(Arc::new(SystemClock), None)),
            Arc::new(UlidGenerator::new(SystemClock)),
            10 * 1024 * 1024,
        );
        Fixture {
            orchestrator,
            store,
            connector,
            converter,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(InMemoryObjectStore::new(), ScriptedConverter::ok())
    }

    fn heic_bytes() -> Bytes {
        let mut bytes = ftyp_box(b"heic", &[b"mif1", b"heic"]);
        bytes.extend_from_slice(b"fake image payload");
        Bytes::from(bytes)
    }

    #[tokio::test]
    async fn upload_registers_fully_populated_job() {
        let f = fixture();

        let receipt = f
            .orchestrator
            .handle_upload(UploadRequest::new("sample.heic", heic_bytes()))
            .await
            .unwrap();

        let record = f.orchestrator.registry().get(&receipt.id).unwrap();
        assert_eq!(record.job_id, receipt.id);
        assert_eq!(
            receipt.original_url,
            format!("{GATEWAY_URL}/1086/{}", record.original_cid)
        );
        assert_eq!(
            receipt.processed_url,
            format!("{GATEWAY_URL}/1086/{}", record.processed_cid)
        );
        assert_ne!(record.original_cid, record.processed_cid);
        assert_eq!(f.store.len(), 2);
    }

    #[tokio::test]
    async fn processed_lookup_matches_receipt() {
        let f = fixture();
        let receipt = f
            .orchestrator
            .handle_upload(UploadRequest::new("IMG_0001.HEIC", heic_bytes()))
            .await
            .unwrap();

        let view = f.orchestrator.processed(&receipt.id.to_string()).unwrap();

        assert_eq!(view.url, receipt.processed_url);
        let record = f.orchestrator.registry().get(&receipt.id).unwrap();
        assert_eq!(view.cid, record.processed_cid);
    }

    #[tokio::test]
    async fn download_returns_converted_bytes() {
        let f = fixture();
        let receipt = f
            .orchestrator
            .handle_upload(UploadRequest::new("sample.heic", heic_bytes()))
            .await
            .unwrap();

        let png = f.orchestrator.download(&receipt.id.to_string()).await.unwrap();
        assert!(is_png(&png));
    }

    #[tokio::test]
    async fn wrong_extension_has_no_side_effects() {
        let f = fixture();

        let err = f
            .orchestrator
            .handle_upload(UploadRequest::new("notes.txt", heic_bytes()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Validation(ValidationError::NotHeic { .. })
        ));
        assert_eq!(f.connector.handshakes(), 0);
        assert_eq!(f.converter.calls.load(Ordering::SeqCst), 0);
        assert!(f.store.is_empty());
        assert!(f.orchestrator.registry().is_empty());
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_before_storage() {
        let f = fixture();
        let big = Bytes::from(vec![0u8; f.orchestrator.max_upload_bytes() + 1]);

        let err = f
            .orchestrator
            .handle_upload(UploadRequest::new("big.heic", big))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(f.connector.handshakes(), 0);
    }

    #[tokio::test]
    async fn conversion_failure_leaves_original_orphaned() {
        let f = fixture_with(
            InMemoryObjectStore::new(),
            ScriptedConverter::failing(ConversionError::NoImages),
        );

        let err = f
            .orchestrator
            .handle_upload(UploadRequest::new("sample.heic", heic_bytes()))
            .await
            .unwrap_err();

        assert_eq!(err, PipelineError::Conversion(ConversionError::NoImages));
        assert_eq!(f.store.len(), 1);
        assert!(f.orchestrator.registry().is_empty());
    }

    #[tokio::test]
    async fn storage_failure_mid_pipeline_registers_nothing() {
        // 1 回目（original）だけ成功し、2 回目（PNG）で失敗する
        let f = fixture_with(
            InMemoryObjectStore::new().with_store_quota(1),
            ScriptedConverter::ok(),
        );

        let err = f
            .orchestrator
            .handle_upload(UploadRequest::new("sample.heic", heic_bytes()))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Storage(StorageError::Request(_))));
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(f.store.len(), 1);
        assert_eq!(f.converter.calls.load(Ordering::SeqCst), 1);
        assert!(f.orchestrator.registry().is_empty());
    }

    #[tokio::test]
    async fn storage_failure_on_original_skips_conversion() {
        let f = fixture_with(
            InMemoryObjectStore::new().with_store_quota(0),
            ScriptedConverter::ok(),
        );

        let err = f
            .orchestrator
            .handle_upload(UploadRequest::new("sample.heic", heic_bytes()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(f.converter.calls.load(Ordering::SeqCst), 0);
        assert!(f.orchestrator.registry().is_empty());
    }

    #[tokio::test]
    async fn unknown_and_malformed_ids_are_not_found() {
        let f = fixture();
        let unknown = UlidGenerator::new(SystemClock).generate_job_id().to_string();

        for id in [unknown.as_str(), "unknown-id", ""] {
            assert_eq!(f.orchestrator.processed(id).unwrap_err().kind(), ErrorKind::NotFound);
            assert_eq!(
                f.orchestrator.download(id).await.unwrap_err().kind(),
                ErrorKind::NotFound
            );
        }
        // lookup だけではストレージに触らない
        assert_eq!(f.connector.handshakes(), 0);
    }

    #[tokio::test]
    async fn concurrent_uploads_get_distinct_jobs() {
        let f = Arc::new(fixture());

        let mut joins = Vec::new();
        for i in 0..16u8 {
            let f = f.clone();
            joins.push(tokio::spawn(async move {
                let mut bytes = heic_bytes().to_vec();
                bytes.push(i);
                f.orchestrator
                    .handle_upload(UploadRequest::new(format!("{i}.heic"), bytes))
                    .await
                    .unwrap()
            }));
        }

        let mut ids = std::collections::HashSet::new();
        for join in joins {
            ids.insert(join.await.unwrap().id);
        }

        assert_eq!(ids.len(), 16);
        assert_eq!(f.orchestrator.registry().len(), 16);
        assert_eq!(f.connector.handshakes(), 1);
    }
}
