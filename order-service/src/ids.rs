use rand::rngs::OsRng;
use rand::Rng;

/// Source of the human-facing codes stamped on orders, shipments and returns.
/// Uniqueness is enforced by the store; callers regenerate on collision.
pub trait CodeGenerator: Send + Sync {
    fn order_code(&self) -> String;
    fn tracking_code(&self) -> String;
    fn return_code(&self) -> String;
}

/// Codes drawn from the operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodes;

fn digits(prefix: &str, width: u32) -> String {
    let upper = 10_u64.pow(width);
    let n = OsRng.gen_range(0..upper);
    format!("{prefix}{n:0width$}", width = width as usize)
}

impl CodeGenerator for RandomCodes {
    fn order_code(&self) -> String { digits("ORD", 9) }
    fn tracking_code(&self) -> String { digits("TRK", 6) }
    fn return_code(&self) -> String { digits("RET", 9) }
}
