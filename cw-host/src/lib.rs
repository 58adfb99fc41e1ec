mod local;
mod logging;
mod runtime;

pub use host_abi::{
    ABI_VERSION, AbiFunction, BRIDGE_FUNCTION_COUNT, EXPORT_ALLOCATE, EXPORT_DEALLOCATE,
    EXPORT_FUNCTION_TABLE, FN_CALL_SET_RESULT, FN_MEMORY_ON_GROW, FN_RAW_UNREGISTER,
    FN_REF_DECREMENT, FN_REF_INCREMENT, FUNCTIONS, abi_json, function_by_index, function_by_name,
};

pub use local::{GuestFunction, LocalGuest};
pub use logging::init as init_logging;
pub use runtime::{HostRuntime, dispatch};
