//! Localization links for types flagged with i18n.
//!
//! A localized type carries a `locale` string and a `_localizations` many-way
//! relation to the built-in `localization` type, whose records name the
//! entity they localize (`ref_type`, `ref_id`) and the locale.

use crate::relationship::{RelationInfo, RelationKind};
use crate::schema::{Attribute, EntityType, ScalarType};

/// Name of the built-in localization type.
pub const LOCALIZATION_TYPE: &str = "localization";

/// Locale attribute added to localized types.
pub const LOCALE_ATTRIBUTE: &str = "locale";

/// Relation attribute linking a localized entity to its localizations.
pub const LOCALIZATIONS_ATTRIBUTE: &str = "_localizations";

/// The built-in `localization` entity type.
pub fn localization_type() -> EntityType {
    EntityType::new(LOCALIZATION_TYPE)
        .scalar("ref_id", ScalarType::String)
        .scalar("ref_type", ScalarType::String)
        .scalar(LOCALE_ATTRIBUTE, ScalarType::String)
}

/// Add the localization attributes to a type. Existing attributes are left alone.
pub fn attach_localization_attributes(ty: &mut EntityType) {
    if !ty.has_attribute(LOCALIZATIONS_ATTRIBUTE) {
        ty.add_attribute(Attribute::relation(
            LOCALIZATIONS_ATTRIBUTE,
            RelationInfo::new(RelationKind::ManyWay, LOCALIZATION_TYPE),
        ));
    }
    if !ty.has_attribute(LOCALE_ATTRIBUTE) {
        ty.add_attribute(Attribute::scalar(LOCALE_ATTRIBUTE, ScalarType::String));
    }
}
