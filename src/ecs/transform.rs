use super::types::{EntityId, Parent, Transform, WorldTransform};
use super::world::SceneWorld;
use glam::{Affine2, Vec2};

impl Transform {
    /// Translate, then rotate, then scale.
    pub fn local_matrix(&self) -> Affine2 {
        Affine2::from_scale_angle_translation(self.scale, self.rotation.to_radians(), self.translation)
    }
}

impl WorldTransform {
    pub fn from_matrix(matrix: Affine2) -> Self {
        let (position, rotation, scale) = decompose(&matrix);
        Self { matrix, position, rotation, scale }
    }
}

pub fn compose(parent_world: &Affine2, local: &Transform) -> Affine2 {
    *parent_world * local.local_matrix()
}

/// Splits an affine matrix into position, rotation (degrees) and scale.
/// A negative determinant is reported as a negative y scale.
pub fn decompose(matrix: &Affine2) -> (Vec2, f32, Vec2) {
    let x_axis = matrix.matrix2.x_axis;
    let y_axis = matrix.matrix2.y_axis;
    let rotation = x_axis.y.atan2(x_axis.x).to_degrees();
    let mut scale = Vec2::new(x_axis.length(), y_axis.length());
    if matrix.matrix2.determinant() < 0.0 {
        scale.y = -scale.y;
    }
    (matrix.translation, rotation, scale)
}

impl SceneWorld {
    pub fn transform(&self, entity: EntityId) -> Option<Transform> {
        self.world.get::<Transform>(entity.0).copied()
    }

    /// Mutable local transform. World fields follow on the next tick.
    pub fn transform_mut(&mut self, entity: EntityId) -> Option<&mut Transform> {
        if self.is_destroyed(entity) {
            return None;
        }
        self.world.get_mut::<Transform>(entity.0).map(|t| t.into_inner())
    }

    pub fn set_transform(&mut self, entity: EntityId, transform: Transform) -> bool {
        match self.transform_mut(entity) {
            Some(slot) => {
                *slot = transform;
                true
            }
            None => false,
        }
    }

    pub fn world_transform(&self, entity: EntityId) -> Option<WorldTransform> {
        self.world.get::<WorldTransform>(entity.0).copied()
    }

    pub fn world_matrix(&self, entity: EntityId) -> Option<Affine2> {
        self.world_transform(entity).map(|w| w.matrix)
    }

    pub fn world_position(&self, entity: EntityId) -> Option<Vec2> {
        self.world_transform(entity).map(|w| w.position)
    }

    pub fn world_rotation(&self, entity: EntityId) -> Option<f32> {
        self.world_transform(entity).map(|w| w.rotation)
    }

    pub fn world_scale(&self, entity: EntityId) -> Option<Vec2> {
        self.world_transform(entity).map(|w| w.scale)
    }

    fn parent_world(&self, entity: EntityId) -> WorldTransform {
        self.world
            .get::<Parent>(entity.0)
            .and_then(|parent| self.world.get::<WorldTransform>(parent.0))
            .copied()
            .unwrap_or_default()
    }

    /// Moves the entity so its world position becomes `position`, measured against
    /// the parent's cached world matrix.
    pub fn set_world_position(&mut self, entity: EntityId, position: Vec2) -> bool {
        let parent = self.parent_world(entity);
        let local = parent.matrix.inverse().transform_point2(position);
        match self.transform_mut(entity) {
            Some(transform) => {
                transform.translation = local;
                true
            }
            None => false,
        }
    }

    /// Picks the local rotation whose world x-axis points along `degrees`.
    pub fn set_world_rotation(&mut self, entity: EntityId, degrees: f32) -> bool {
        let parent = self.parent_world(entity);
        let radians = degrees.to_radians();
        let world_dir = Vec2::new(radians.cos(), radians.sin());
        let local_dir = parent.matrix.matrix2.inverse() * world_dir;
        let local = local_dir.y.atan2(local_dir.x).to_degrees();
        match self.transform_mut(entity) {
            Some(transform) => {
                transform.rotation = local;
                true
            }
            None => false,
        }
    }

    pub fn set_world_scale(&mut self, entity: EntityId, scale: Vec2) -> bool {
        let parent = self.parent_world(entity);
        let divisor = Vec2::new(
            if parent.scale.x.abs() > f32::EPSILON { parent.scale.x } else { 1.0 },
            if parent.scale.y.abs() > f32::EPSILON { parent.scale.y } else { 1.0 },
        );
        match self.transform_mut(entity) {
            Some(transform) => {
                transform.scale = scale / divisor;
                true
            }
            None => false,
        }
    }

    /// Recomputes one entity's cached world pose from its parent's cache.
    pub fn refresh_world_transform(&mut self, entity: EntityId) -> Option<WorldTransform> {
        let local = *self.world.get::<Transform>(entity.0)?;
        let parent = self.parent_world(entity);
        let world = WorldTransform::from_matrix(compose(&parent.matrix, &local));
        if let Some(mut slot) = self.world.get_mut::<WorldTransform>(entity.0) {
            *slot = world;
        }
        Some(world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn decompose_recovers_local_components() {
        let local = Transform {
            translation: Vec2::new(3.0, -2.0),
            rotation: 30.0,
            scale: Vec2::new(2.0, 0.5),
        };
        let (pos, rot, scale) = decompose(&local.local_matrix());
        assert!(pos.abs_diff_eq(local.translation, 1e-5));
        assert_abs_diff_eq!(rot, 30.0, epsilon = 1e-4);
        assert!(scale.abs_diff_eq(local.scale, 1e-5));
    }

    #[test]
    fn mirrored_scale_reports_negative_y() {
        let local = Transform { scale: Vec2::new(1.0, -3.0), ..Transform::default() };
        let (_, rot, scale) = decompose(&local.local_matrix());
        assert_abs_diff_eq!(rot, 0.0, epsilon = 1e-5);
        assert!(scale.abs_diff_eq(Vec2::new(1.0, -3.0), 1e-5));
    }

    #[test]
    fn compose_applies_parent_rotation_to_child_offset() {
        let parent = Transform::from_translation(Vec2::new(10.0, 0.0)).with_rotation(90.0);
        let child = Transform::from_translation(Vec2::new(5.0, 0.0));
        let world = compose(&parent.local_matrix(), &child);
        assert!(world.translation.abs_diff_eq(Vec2::new(10.0, 5.0), 1e-4));
    }
}
