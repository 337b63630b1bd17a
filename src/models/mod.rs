pub mod actor;
pub mod audit;
pub mod invoice;
pub mod procurement;
pub mod result;
pub mod status;

pub use actor::{Actor, Role};
pub use audit::{AuditEntry, AuditFilter, NewAuditEntry};
pub use invoice::{
    ApprovalRecord, ApprovalStatus, HilReview, HilStatus, InfoRequest, Invoice,
    InvoiceCorrections, InvoiceFilter, InvoicePatch, LineItem, NewInvoice,
};
pub use procurement::{
    Annexure, AnnexureStatus, GoodsReceipt, PoLineItem, PoStatus, PurchaseOrder, ReceiptLine,
};
pub use result::{
    CeilingSource, Discrepancy, DiscrepancyCode, LinePairing, MatchResult, MatchedPo, PairedBy,
};
pub use status::InvoiceStatus;
