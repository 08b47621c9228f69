//! Blob read and write paths.
//!
//! Blobs live under a transaction: a quad id stored in a row addresses
//! segmented content opened, streamed and closed through its own handle.
use crate::{
    error::Result,
    proto::{
        BLOB_FINISHED, BLOB_SEGMENT_SIZE,
        frontend::{BatchSegments, CreateBlob, GetSegment, HandleOp, OpenBlob},
        op,
    },
    transaction::Transaction,
    types::BlobId,
    wire::blr::BlrReader,
};

impl Transaction<'_> {
    /// Materialize the blob behind `id` into one buffer.
    pub async fn read_blob(&self, id: BlobId) -> Result<Vec<u8>> {
        let resp = self
            .conn()
            .response(OpenBlob {
                tr_handle: self.handle(),
                id: (id.high, id.low),
            })
            .await?;
        let blob_handle = resp.handle;

        let mut out = Vec::new();
        loop {
            let resp = self.conn().response(GetSegment { blob_handle }).await?;
            let mut r = BlrReader::new(&resp.buffer);
            out.extend_from_slice(&r.get_segments()?);
            if resp.handle == BLOB_FINISHED {
                break;
            }
        }
        self.conn()
            .forget(HandleOp { op: op::CLOSE_BLOB, handle: blob_handle });
        Ok(out)
    }

    /// Store `data` as a new blob, returning the id to bind or insert.
    pub async fn create_blob(&self, data: &[u8]) -> Result<BlobId> {
        let resp = self
            .conn()
            .response(CreateBlob { tr_handle: self.handle() })
            .await?;
        let blob_handle = resp.handle;
        let id = resp.id;

        for segment in data.chunks(BLOB_SEGMENT_SIZE) {
            self.conn()
                .response(BatchSegments { blob_handle, segment })
                .await?;
        }
        self.conn()
            .response(HandleOp { op: op::CLOSE_BLOB, handle: blob_handle })
            .await?;
        Ok(id)
    }
}
