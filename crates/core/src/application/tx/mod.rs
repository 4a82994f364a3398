// Transaction management over a connection source and a persistence runtime

mod hooks;
mod manager;
mod status;
mod template;

pub use hooks::TransactionHooks;
pub use manager::ContextTransactionManager;
pub use status::TransactionStatus;
pub use template::TransactionTemplate;
