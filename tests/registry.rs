use canvas_scaler::engine::component::{
    component_description, component_id_of, freeze_components, make_empty_column, register_component,
};
use canvas_scaler::engine::error::{ECSError, RegistryError};
use canvas_scaler::engine::storage::TypeErasedColumn;

struct Early(#[allow(dead_code)] u32);

struct Late;

// One test only: freezing is process-wide.
#[test]
fn registry_lifecycle() {
    let early = register_component::<Early>().unwrap();
    assert_eq!(register_component::<Early>().unwrap(), early);
    assert_eq!(component_id_of::<Early>().unwrap(), early);

    let desc = component_description(early).unwrap();
    assert!(desc.name.ends_with("Early"));
    assert!(make_empty_column(early).unwrap().is_empty());

    assert!(matches!(
        component_id_of::<Late>(),
        Err(ECSError::Registry(RegistryError::NotRegistered { .. }))
    ));

    freeze_components().unwrap();
    assert_eq!(register_component::<Early>().unwrap(), early);
    assert!(matches!(
        register_component::<Late>(),
        Err(ECSError::Registry(RegistryError::Frozen { .. }))
    ));
}
