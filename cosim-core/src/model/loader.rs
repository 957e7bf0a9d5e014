use crate::errors::CosimResult;
use crate::model::ModelInstance;

/// Turns a model package reference from the settings into an instance.
///
/// Loaders own whatever the reference points to (archives, extracted files);
/// the returned instance releases it when terminated.
pub trait ModelPackageLoader {
    fn load(&self, reference: &str, instance_name: &str) -> CosimResult<Box<dyn ModelInstance>>;
}
