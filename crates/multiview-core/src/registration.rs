use std::collections::BTreeMap;

use tracing::debug;

use crate::dataset::ViewDataset;
use crate::error::{FusionError, Result};
use crate::transform::Affine3;
use crate::view::ViewId;

/// Registrations of all views taking part in one run, resolved once before
/// any parallel work starts and read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct RegistrationSnapshot {
    models: BTreeMap<ViewId, Affine3>,
}

impl RegistrationSnapshot {
    /// Resolve the registration of every view in `views`. With a
    /// `downsampling` factor the models are rescaled so they map into the
    /// downsampled output space.
    pub fn resolve<I>(dataset: &dyn ViewDataset, views: I, downsampling: Option<f64>) -> Result<Self>
    where
        I: IntoIterator<Item = ViewId>,
    {
        let mut models = BTreeMap::new();
        for view in views {
            if models.contains_key(&view) {
                continue;
            }
            let mut model = dataset.registration(view)?;
            if let Some(ds) = downsampling {
                model = model.scaled(1.0 / ds);
            }
            debug!(view = %view, "Resolved registration");
            models.insert(view, model);
        }
        Ok(Self { models })
    }

    pub fn from_models(models: BTreeMap<ViewId, Affine3>) -> Self {
        Self { models }
    }

    pub fn get(&self, view: ViewId) -> Result<&Affine3> {
        self.models.get(&view).ok_or(FusionError::UnknownView(view))
    }

    /// Inverse model mapping output coordinates back into the view's image.
    pub fn inverse(&self, view: ViewId) -> Result<Affine3> {
        self.get(view)?
            .inverse()
            .ok_or(FusionError::SingularTransform(view))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
