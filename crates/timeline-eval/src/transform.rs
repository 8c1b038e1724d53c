//! Parent/child transform composition.

use ms_common::{ClipTransform, Position3, Rotation3, Scale2};

/// Compose a child transform inside its parent (parent is outer).
///
/// - opacity multiplies
/// - scale multiplies per axis
/// - rotations add per axis
/// - the child's x/y offset is scaled by the parent scale, rotated by the
///   parent z rotation, then translated by the parent position
/// - z adds
/// - blend mode is the child's own
pub fn compose(parent: &ClipTransform, child: &ClipTransform) -> ClipTransform {
    let (sin, cos) = parent.rotation.z.to_radians().sin_cos();
    let sx = child.position.x * parent.scale.x;
    let sy = child.position.y * parent.scale.y;

    ClipTransform {
        opacity: parent.opacity * child.opacity,
        blend_mode: child.blend_mode,
        position: Position3 {
            x: parent.position.x + sx * cos - sy * sin,
            y: parent.position.y + sx * sin + sy * cos,
            z: parent.position.z + child.position.z,
        },
        scale: Scale2 {
            x: parent.scale.x * child.scale.x,
            y: parent.scale.y * child.scale.y,
        },
        rotation: Rotation3 {
            x: parent.rotation.x + child.rotation.x,
            y: parent.rotation.y + child.rotation.y,
            z: parent.rotation.z + child.rotation.z,
        },
    }
}
